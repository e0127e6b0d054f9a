//! Role checks and sign-in rules seen from a client.

use chatwire::{Message, Role};
use chatwire_testing::{SEEDED_SECRET, TestServer, assert_silent, seeded_context};
use rstest::rstest;

fn roster() -> Vec<(&'static str, Role)> {
    vec![
        ("oma", Role::User),
        ("opa", Role::User),
        ("agencyOne", Role::Agency),
        ("admin", Role::Admin),
    ]
}

#[rstest]
#[case::wiretap_user(Message::wiretap_user("oma", "opa", None))]
#[case::wiretap_group(Message::wiretap_group("oma", "knitting", None))]
#[case::approve(Message::approve("oma", None, "*"))]
#[case::reject(Message::reject("oma", None, "*"))]
#[case::role(Message::role("oma", "oma", Role::God))]
#[case::parent_control(Message::parent_control("oma", "opa", Some("on")))]
#[case::logger(Message::logger("oma", Some("on")))]
#[tokio::test]
async fn user_is_refused_privileged_commands(#[case] command: Message) {
    let server = TestServer::start(seeded_context(&roster())).await;
    let mut oma = server.signed_in("oma").await;
    oma.send(command).await;
    assert_eq!(oma.recv().await, Message::no_acknowledge(Some("permission denied")));
    assert_eq!(server.ctx().users().lookup("oma").map(|r| r.role), Some(Role::User));
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn agency_cannot_approve_its_own_request() {
    let server = TestServer::start(seeded_context(&roster())).await;
    let mut agency = server.signed_in("agencyOne").await;
    agency.send(Message::wiretap_user("agencyOne", "oma", None)).await;
    agency.recv().await;
    agency.send(Message::approve("agencyOne", None, "#1")).await;
    assert_eq!(agency.recv().await, Message::no_acknowledge(Some("permission denied")));
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn failed_sign_in_can_be_retried() {
    let server = TestServer::start(seeded_context(&roster())).await;
    let mut client = server.connect().await;
    assert_eq!(
        client.sign_in("oma", "wrong").await,
        Message::no_acknowledge(Some("invalid credentials"))
    );
    assert_eq!(
        client.sign_in("oma", SEEDED_SECRET).await,
        Message::acknowledge("oma", Some("user"))
    );
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn commands_before_sign_in_are_refused() {
    let server = TestServer::start(seeded_context(&roster())).await;
    let mut client = server.connect().await;
    client.send(Message::broadcast("oma", "sneaky")).await;
    assert_eq!(client.recv().await, Message::no_acknowledge(Some("not signed in")));
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn one_session_per_user() {
    let server = TestServer::start(seeded_context(&roster())).await;
    let _first = server.signed_in("oma").await;
    let mut second = server.connect().await;
    assert_eq!(
        second.sign_in("oma", SEEDED_SECRET).await,
        Message::no_acknowledge(Some("oma is already connected"))
    );
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn claimed_sender_is_replaced_by_signed_in_name() {
    let server = TestServer::start(seeded_context(&roster())).await;
    let mut oma = server.signed_in("oma").await;
    let mut opa = server.signed_in("opa").await;
    oma.send(Message::direct("admin", "opa", "it is me, the admin")).await;
    assert_eq!(opa.recv().await, Message::direct("oma", "opa", "it is me, the admin"));
    assert_silent!(oma);
    server.shutdown().await.expect("shutdown");
}

#[rstest]
#[tokio::test]
async fn promoted_user_gains_commands_immediately() {
    let server = TestServer::start(seeded_context(&roster())).await;
    let mut admin = server.signed_in("admin").await;
    let mut opa = server.signed_in("opa").await;
    admin.send(Message::role("admin", "opa", Role::Agency)).await;
    admin.recv().await;
    assert_eq!(opa.recv().await, Message::role("admin", "opa", Role::Agency));

    opa.send(Message::wiretap_user("opa", "oma", None)).await;
    assert_eq!(
        opa.recv().await,
        Message::acknowledge("opa", Some("wiretap request #1 pending"))
    );
    server.shutdown().await.expect("shutdown");
}
