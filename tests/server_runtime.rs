//! Server behaviour under load, shutdown and alternative configuration.

use std::{collections::HashMap, time::Duration};

use chatwire::{
    Message,
    MessageCodec,
    NullMarker,
    Role,
    ServerConfig,
    connection::active_session_count,
};
use chatwire_testing::{SEEDED_SECRET, TestClient, TestServer, seeded_context};

#[tokio::test]
async fn direct_messages_arrive_in_send_order() {
    let server = TestServer::start(seeded_context(&[("a", Role::User), ("b", Role::User)])).await;
    let mut a = server.signed_in("a").await;
    let mut b = server.signed_in("b").await;

    for n in 0..200 {
        a.send(Message::direct("a", "b", &format!("m{n}"))).await;
    }
    let texts: Vec<_> = b
        .recv_n(200)
        .await
        .into_iter()
        .map(|m| m.text().map(str::to_owned))
        .collect();
    let expected: Vec<_> = (0..200).map(|n| Some(format!("m{n}"))).collect();
    assert_eq!(texts, expected);
    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn concurrent_broadcasters_keep_per_sender_order() {
    let names = ["s0", "s1", "s2", "s3", "listener"];
    let roster: Vec<_> = names.iter().map(|n| (*n, Role::User)).collect();
    let server = TestServer::start(seeded_context(&roster)).await;
    let mut listener = server.signed_in("listener").await;

    let mut senders = Vec::new();
    for name in &names[..4] {
        senders.push(server.signed_in(name).await);
    }
    let tasks: Vec<_> = senders
        .into_iter()
        .zip(names)
        .map(|(mut client, name)| {
            tokio::spawn(async move {
                for n in 0..25 {
                    client.send(Message::broadcast(name, &n.to_string())).await;
                }
                client
            })
        })
        .collect();
    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.expect("sender task"));
    }

    let mut seen: HashMap<String, Vec<u32>> = HashMap::new();
    for message in listener.recv_n(100).await {
        let sender = message.sender().expect("broadcast has sender").to_owned();
        let n = message
            .text()
            .and_then(|t| t.parse().ok())
            .expect("numeric text");
        seen.entry(sender).or_default().push(n);
    }
    assert_eq!(seen.len(), 4);
    for sequence in seen.values() {
        assert_eq!(*sequence, (0..25).collect::<Vec<u32>>());
    }
    drop(clients);
    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn shutdown_closes_live_sessions() {
    let server = TestServer::start(seeded_context(&[("a", Role::User)])).await;
    let mut a = server.signed_in("a").await;
    let mut idle = server.connect().await;
    server.shutdown().await.expect("shutdown");
    assert!(a.closed_within(Duration::from_secs(1)).await);
    assert!(idle.closed_within(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn negative_length_marker_keeps_literal_dashes() {
    let ctx = seeded_context(&[("a", Role::User), ("b", Role::User)]);
    let config = ServerConfig::default()
        .with_tick_period(Duration::from_millis(1))
        .with_null_marker(NullMarker::NegativeLength);
    let server = TestServer::start_with(ctx, config).await;
    let codec = MessageCodec::default().with_null_marker(NullMarker::NegativeLength);

    let mut a = TestClient::connect_with(server.addr(), codec.clone()).await;
    let mut b = TestClient::connect_with(server.addr(), codec).await;
    assert_eq!(
        a.sign_in("a", SEEDED_SECRET).await,
        Message::acknowledge("a", Some("user"))
    );
    b.sign_in("b", SEEDED_SECRET).await;

    a.send(Message::direct("a", "b", "--")).await;
    let received = b.recv().await;
    assert_eq!(received.text(), Some("--"));
    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn deleted_user_is_disconnected() {
    let server = TestServer::start(seeded_context(&[("root", Role::God), ("bob", Role::User)])).await;
    let mut root = server.signed_in("root").await;
    let mut bob = server.signed_in("bob").await;

    root.send(Message::delete("root", Some("USER bob"))).await;
    assert_eq!(
        root.recv().await,
        Message::acknowledge("root", Some("deleted user bob"))
    );
    assert_eq!(bob.recv().await, Message::quit("bob"));
    assert!(bob.closed_within(Duration::from_secs(1)).await);
    assert!(server.ctx().users().lookup("bob").is_none());

    let mut again = server.connect().await;
    assert_eq!(again.sign_in("bob", SEEDED_SECRET).await.kind(), chatwire::MessageType::NoAcknowledge);
    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn sessions_are_counted_while_open() {
    let server = TestServer::start(seeded_context(&[("a", Role::User)])).await;
    let _a = server.signed_in("a").await;
    assert!(active_session_count() >= 1);
    server.shutdown().await.expect("shutdown");
}
