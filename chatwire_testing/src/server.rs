//! Running a [`ChatServer`] on an ephemeral port.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use chatwire::{ChatServer, Role, ServerConfig, ServerContext, ServerError};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::client::TestClient;

/// Secret given to every account created by [`seeded_context`].
pub const SEEDED_SECRET: &str = "pw";

/// In-memory context holding `users`, each with [`SEEDED_SECRET`].
///
/// # Panics
///
/// Panics if a name is rejected by the user directory.
#[must_use]
pub fn seeded_context(users: &[(&str, Role)]) -> Arc<ServerContext> {
    let ctx = ServerContext::in_memory();
    for (name, role) in users {
        ctx.users()
            .create_user(name, SEEDED_SECRET, *role)
            .unwrap_or_else(|e| panic!("seeding {name} failed: {e}"));
    }
    Arc::new(ctx)
}

/// A server running in a background task until [`TestServer::shutdown`].
pub struct TestServer {
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Start a server with a 1 ms tick.
    pub async fn start(ctx: Arc<ServerContext>) -> Self {
        Self::start_with(ctx, ServerConfig::default().with_tick_period(Duration::from_millis(1))).await
    }

    /// Start a server with `config` and wait until it accepts connections.
    ///
    /// # Panics
    ///
    /// Panics if binding fails or the server never signals readiness.
    pub async fn start_with(ctx: Arc<ServerContext>, config: ServerConfig) -> Self {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = ChatServer::new(Arc::clone(&ctx))
            .with_config(config)
            .workers(2)
            .ready_signal(ready_tx)
            .bind(([127, 0, 0, 1], 0).into())
            .expect("bind test server");
        let addr = server.local_addr().expect("bound server has an address");
        let handle = tokio::spawn(server.run_with_shutdown(async {
            let _ = shutdown_rx.await;
        }));
        ready_rx.await.expect("server readiness");
        Self {
            addr,
            ctx,
            shutdown,
            handle,
        }
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    #[must_use]
    pub fn ctx(&self) -> &ServerContext { &self.ctx }

    /// Open a new client connection.
    pub async fn connect(&self) -> TestClient { TestClient::connect(self.addr).await }

    /// Connect and sign in as `name`, discarding the acknowledgement.
    ///
    /// # Panics
    ///
    /// Panics unless the server acknowledges the sign-in.
    pub async fn signed_in(&self, name: &str) -> TestClient {
        let mut client = self.connect().await;
        let reply = client.sign_in(name, SEEDED_SECRET).await;
        assert_eq!(reply.kind(), chatwire::MessageType::Acknowledge, "sign in as {name}: {reply:?}");
        client
    }

    /// Stop the server and wait for every session to end.
    ///
    /// # Errors
    ///
    /// Returns the server's own error, if any.
    ///
    /// # Panics
    ///
    /// Panics if the server task panicked.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        let _ = self.shutdown.send(());
        self.handle.await.expect("server task panicked")
    }
}
