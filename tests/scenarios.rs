//! End-to-end protocol scenarios over TCP.

use std::time::Duration;

use chatwire::{Message, MessageType, Role};
use chatwire_testing::{
    LoggerHandle,
    SEEDED_SECRET,
    TestServer,
    assert_silent,
    logger,
    recv_kind,
    seeded_context,
};
use log::Level;
use rstest::{fixture, rstest};

#[fixture]
fn users() -> Vec<(&'static str, Role)> {
    vec![
        ("A", Role::User),
        ("B", Role::User),
        ("C", Role::User),
        ("oma", Role::User),
        ("agencyOne", Role::Agency),
        ("admin", Role::Admin),
    ]
}

#[rstest]
#[tokio::test]
async fn login_without_secret_is_answered_not_dropped(users: Vec<(&'static str, Role)>) {
    let server = TestServer::start(seeded_context(&users)).await;
    let mut client = server.connect().await;
    client.send_raw(b"HLO 4 temp 2 -- 2 -- 2 --").await;
    assert_eq!(client.recv().await, Message::no_acknowledge(Some("missing secret")));

    let ack = client.sign_in("A", SEEDED_SECRET).await;
    assert_eq!(ack, Message::acknowledge("A", Some("user")));
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn broadcast_reaches_every_other_session(users: Vec<(&'static str, Role)>) {
    let server = TestServer::start(seeded_context(&users)).await;
    let mut a = server.signed_in("A").await;
    let mut b = server.signed_in("B").await;
    let mut c = server.signed_in("C").await;

    a.send(Message::broadcast("A", "test")).await;
    assert_eq!(b.recv().await, Message::broadcast("A", "test"));
    assert_eq!(c.recv().await, Message::broadcast("A", "test"));
    assert_silent!(a);
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn approved_wiretap_mirrors_direct_messages(users: Vec<(&'static str, Role)>) {
    let server = TestServer::start(seeded_context(&users)).await;
    let mut agency = server.signed_in("agencyOne").await;
    let mut admin = server.signed_in("admin").await;
    let mut oma = server.signed_in("oma").await;
    let mut b = server.signed_in("B").await;

    agency.send(Message::wiretap_user("agencyOne", "oma", None)).await;
    assert_eq!(
        agency.recv().await,
        Message::acknowledge("agencyOne", Some("wiretap request #1 pending"))
    );
    admin.send(Message::approve("admin", None, "#1")).await;
    assert_eq!(
        admin.recv().await,
        Message::acknowledge("admin", Some("approved 1 requests"))
    );
    recv_kind!(agency, MessageType::Approve);

    b.send(Message::direct("B", "oma", "to oma")).await;
    assert_eq!(oma.recv().await, Message::direct("B", "oma", "to oma"));
    assert_eq!(agency.recv().await, Message::direct("B", "oma", "to oma"));

    oma.send(Message::direct("oma", "B", "from oma")).await;
    assert_eq!(b.recv().await, Message::direct("oma", "B", "from oma"));
    assert_eq!(agency.recv().await, Message::direct("oma", "B", "from oma"));
    assert_silent!(agency);
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn direct_to_offline_user_keeps_sender_connected(users: Vec<(&'static str, Role)>) {
    let server = TestServer::start(seeded_context(&users)).await;
    let mut a = server.signed_in("A").await;

    a.send(Message::direct("A", "B", "anyone there?")).await;
    assert_eq!(a.recv().await, Message::no_acknowledge(Some("unknown recipient B")));

    a.send(Message::help("A")).await;
    assert_eq!(
        a.recv().await,
        Message::help_reply("A", "HLP BYE BCT DIR GRP RET UPD DEL JIN LVE RCL")
    );
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn junk_before_a_frame_is_skipped(users: Vec<(&'static str, Role)>) {
    let server = TestServer::start(seeded_context(&users)).await;
    let mut a = server.connect().await;
    a.send_raw(b"hello? ").await;
    a.send(Message::signin("A", SEEDED_SECRET)).await;
    assert_eq!(a.recv().await, Message::acknowledge("A", Some("user")));
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn long_typed_words_are_logged_and_skipped(
    users: Vec<(&'static str, Role)>,
    mut logger: LoggerHandle,
) {
    let server = TestServer::start(seeded_context(&users)).await;
    let mut a = server.signed_in("A").await;
    a.send_raw(b"ABCDEFGHIJ 1 a 2 -- 2 -- ").await;
    a.send(Message::help("A")).await;
    assert_eq!(recv_kind!(a, MessageType::Help).receiver(), Some("A"));
    assert!(logger.saw(Level::Warn, "discarding unrecognised token"));
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn malformed_frame_closes_the_connection(users: Vec<(&'static str, Role)>) {
    let server = TestServer::start(seeded_context(&users)).await;
    let mut a = server.signed_in("A").await;
    a.send_raw(b"BCT x 2 -- 2 --").await;
    assert!(a.closed_within(Duration::from_secs(1)).await);
    assert!(!server.ctx().registry().is_online("A"));
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn quit_is_echoed_before_close(users: Vec<(&'static str, Role)>) {
    let server = TestServer::start(seeded_context(&users)).await;
    let mut a = server.signed_in("A").await;
    a.send(Message::quit("A")).await;
    assert_eq!(a.recv().await, Message::quit("A"));
    assert!(a.closed_within(Duration::from_secs(1)).await);
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn history_is_retrievable(users: Vec<(&'static str, Role)>) {
    let server = TestServer::start(seeded_context(&users)).await;
    let mut a = server.signed_in("A").await;
    let mut b = server.signed_in("B").await;

    a.send(Message::direct("A", "B", "first")).await;
    b.recv().await;
    b.send(Message::retrieve("B", "RECEIVE_MESSAGES")).await;
    let line = recv_kind!(b, MessageType::Retrieve);
    assert!(line.text().is_some_and(|text| text.contains("first")), "{line:?}");
    assert_eq!(b.recv().await, Message::acknowledge("B", Some("1 results")));
    server.shutdown().await.expect("shutdown");
}
