//! Tests for server runtime behaviour.

use std::{
    io,
    sync::{Arc, Mutex},
};

use futures::{SinkExt, StreamExt};
use rstest::rstest;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::yield_now,
    time::{Duration, Instant, advance, timeout},
};
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};

use super::{AcceptLoopOptions, ChatServer, MockAcceptListener, accept_loop};
use crate::{
    codec::MessageCodec,
    config::ServerConfig,
    context::ServerContext,
    message::Message,
    router::CommandRouter,
    server::test_util::{bind_server, context, free_listener},
};

fn options(ctx: Arc<ServerContext>, config: ServerConfig, token: &CancellationToken, tracker: &TaskTracker) -> AcceptLoopOptions {
    AcceptLoopOptions {
        router: CommandRouter::new(ctx),
        config,
        shutdown: token.clone(),
        tracker: tracker.clone(),
    }
}

#[rstest]
#[tokio::test]
async fn run_with_immediate_shutdown(context: Arc<ServerContext>, free_listener: std::net::TcpListener) {
    let server = bind_server(context, free_listener);
    let shutdown_future = async { tokio::time::sleep(Duration::from_millis(10)).await };
    let result = timeout(
        Duration::from_millis(1000),
        server.run_with_shutdown(shutdown_future),
    )
    .await;
    assert!(result.expect("server did not finish in time").is_ok());
}

#[rstest]
#[tokio::test]
async fn ready_signal_fires_once_loops_are_spawned(
    context: Arc<ServerContext>,
    free_listener: std::net::TcpListener,
) {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = bind_server(context, free_listener).ready_signal(ready_tx);
    let handle = tokio::spawn(async move {
        server
            .run_with_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
            .expect("server run failed");
    });
    timeout(Duration::from_secs(1), ready_rx)
        .await
        .expect("ready in time")
        .expect("ready sender kept");
    let _ = stop_tx.send(());
    handle.await.expect("server join error");
}

#[rstest]
#[tokio::test]
async fn sessions_are_served_and_cancelled_on_shutdown(
    context: Arc<ServerContext>,
    free_listener: std::net::TcpListener,
) {
    let addr = free_listener.local_addr().expect("addr");
    let server = bind_server(Arc::clone(&context), free_listener);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_with_shutdown(async {
        let _ = stop_rx.await;
    }));

    let stream = TcpStream::connect(addr).await.expect("connect");
    let mut client = Framed::new(stream, MessageCodec::default());
    client
        .send(Message::signin("alice", "pw"))
        .await
        .expect("send");
    let reply = timeout(Duration::from_secs(1), client.next())
        .await
        .expect("reply in time")
        .expect("stream open")
        .expect("decodable reply");
    assert_eq!(reply, Message::acknowledge("alice", Some("user")));
    assert!(context.registry().is_online("alice"));

    let _ = stop_tx.send(());
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("shutdown in time")
        .expect("join")
        .expect("server run");
    assert!(!context.registry().is_online("alice"));
}

#[rstest]
#[tokio::test]
async fn accept_loop_shutdown_signal(context: Arc<ServerContext>) {
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let listener = Arc::new(
        TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener"),
    );

    tracker.spawn(accept_loop(
        listener,
        options(context, ServerConfig::default(), &token, &tracker),
    ));

    token.cancel();
    tracker.close();

    let result = timeout(Duration::from_millis(100), tracker.wait()).await;
    assert!(result.is_ok());
}

/// Creates a mock listener that fails while recording call times.
fn setup_backoff_mock_listener(
    calls: &Arc<Mutex<Vec<Instant>>>,
    num_calls: usize,
) -> MockAcceptListener {
    let mut listener = MockAcceptListener::new();
    let call_log = Arc::clone(calls);
    listener
        .expect_accept()
        .returning(move || {
            let call_log = Arc::clone(&call_log);
            Box::pin(async move {
                call_log.lock().expect("lock").push(Instant::now());
                Err(io::Error::other("mock error"))
            })
        })
        .times(num_calls);
    listener
        .expect_local_addr()
        .returning(|| Ok("127.0.0.1:0".parse().expect("addr parse")))
        .times(num_calls);
    listener
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn accept_loop_backs_off_exponentially(context: Arc<ServerContext>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(setup_backoff_mock_listener(&calls, 4));
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let config = ServerConfig::default()
        .with_accept_backoff(Duration::from_millis(5), Duration::from_millis(20));

    tracker.spawn(accept_loop(listener, options(context, config, &token, &tracker)));

    yield_now().await;
    assert_eq!(calls.lock().expect("lock").len(), 1);

    for ms in [5, 10, 20] {
        advance(Duration::from_millis(ms)).await;
        yield_now().await;
    }

    token.cancel();
    advance(Duration::from_millis(20)).await;
    yield_now().await;
    tracker.close();
    tracker.wait().await;

    let calls = calls.lock().expect("lock");
    let intervals: Vec<_> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        intervals,
        vec![
            Duration::from_millis(5),
            Duration::from_millis(10),
            Duration::from_millis(20),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn unbound_server_has_no_address(context: Arc<ServerContext>) {
    assert!(ChatServer::new(context).local_addr().is_none());
}
