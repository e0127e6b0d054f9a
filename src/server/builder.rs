//! Construction and listener binding for [`ChatServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::{net::TcpListener, sync::oneshot};

use super::{Bound, ChatServer, ServerError, ServerState, Unbound};
use crate::{config::ServerConfig, context::ServerContext, router::CommandRouter};

impl ChatServer<Unbound> {
    /// Create a server routing commands against `ctx`.
    ///
    /// The worker count defaults to the number of available CPU cores (or 1
    /// if this cannot be determined). Call [`bind`](Self::bind) before
    /// running the server.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use chatwire::{context::ServerContext, server::ChatServer};
    ///
    /// let server = ChatServer::new(Arc::new(ServerContext::in_memory()));
    /// assert!(server.worker_count() >= 1);
    /// assert!(server.local_addr().is_none());
    /// ```
    #[must_use]
    pub fn new(ctx: Arc<ServerContext>) -> Self { Self::with_router(CommandRouter::new(ctx)) }

    /// Create a server around an existing router.
    #[must_use]
    pub fn with_router(router: CommandRouter) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            router,
            config: ServerConfig::default(),
            workers,
            ready_tx: None,
            state: Unbound,
        }
    }

    /// Bind to a fresh address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if binding or configuring the listener
    /// fails.
    pub fn bind(self, addr: SocketAddr) -> Result<ChatServer<Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_listener(std_listener)
    }

    /// Bind to an existing `StdTcpListener`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be registered
    /// with the runtime.
    pub fn bind_listener(self, std_listener: StdTcpListener) -> Result<ChatServer<Bound>, ServerError> {
        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;
        let ChatServer {
            router,
            config,
            workers,
            ready_tx,
            ..
        } = self;
        Ok(ChatServer {
            router,
            config,
            workers,
            ready_tx,
            state: Bound {
                listener: Arc::new(listener),
            },
        })
    }
}

impl<S: ServerState> ChatServer<S> {
    /// Set the number of accept loops to spawn.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Replace the server configuration.
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    #[must_use]
    pub fn worker_count(&self) -> usize { self.workers }

    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.config }

    #[must_use]
    pub fn router(&self) -> &CommandRouter { &self.router }

    /// Returns the bound address, or `None` before binding.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.local_addr() }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener as StdTcpListener, time::Duration};

    use rstest::rstest;

    use super::*;
    use crate::server::test_util::{context, free_listener, listener_addr};

    #[rstest]
    fn worker_count_is_at_least_one(context: Arc<ServerContext>) {
        let server = ChatServer::new(context).workers(0);
        assert_eq!(server.worker_count(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn config_is_carried_through_binding(context: Arc<ServerContext>, free_listener: StdTcpListener) {
        let config = ServerConfig::default().with_tick_period(Duration::from_millis(25));
        let server = ChatServer::new(context)
            .with_config(config)
            .workers(3)
            .bind_listener(free_listener)
            .expect("bind");
        assert_eq!(server.config().tick_period(), Duration::from_millis(25));
        assert_eq!(server.worker_count(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn bind_listener_reports_its_address(context: Arc<ServerContext>, free_listener: StdTcpListener) {
        let expected = listener_addr(&free_listener);
        let server = ChatServer::new(context)
            .bind_listener(free_listener)
            .expect("bind");
        assert_eq!(server.local_addr(), Some(expected));
    }

    #[rstest]
    #[tokio::test]
    async fn bind_to_occupied_port_fails(context: Arc<ServerContext>, free_listener: StdTcpListener) {
        let addr = listener_addr(&free_listener);
        let err = ChatServer::new(context)
            .bind(addr)
            .err()
            .expect("port is taken");
        assert!(matches!(err, ServerError::Bind(_)));
    }
}
