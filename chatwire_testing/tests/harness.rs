//! Coverage for the server and client harness itself.

use std::time::Duration;

use chatwire::{Message, MessageType, Role};
use chatwire_testing::{SEEDED_SECRET, TestServer, assert_silent, recv_kind, seeded_context};

#[tokio::test]
async fn sign_in_and_quit_round_trip() {
    let server = TestServer::start(seeded_context(&[("alice", Role::User)])).await;
    let mut alice = server.connect().await;
    let ack = alice.sign_in("alice", SEEDED_SECRET).await;
    assert_eq!(ack, Message::acknowledge("alice", Some("user")));
    assert_silent!(alice);

    alice.send(Message::quit("alice")).await;
    recv_kind!(alice, MessageType::Quit);
    assert!(alice.closed_within(Duration::from_secs(1)).await);
    server.shutdown().await.expect("clean shutdown");
}
