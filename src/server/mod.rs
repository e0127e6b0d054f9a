//! Tokio-based chat server.
//!
//! `ChatServer` accepts TCP connections and gives each one a
//! [`ConnectionSession`](crate::connection::ConnectionSession) ticked on a
//! fixed interval by its own task on the shared worker pool.

use std::{net::SocketAddr, sync::Arc};

use tokio::{net::TcpListener, sync::oneshot};

use crate::{config::ServerConfig, router::CommandRouter};

/// Tokio-based server hosting chat sessions.
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// (not yet bound to a TCP listener) or [`Bound`]. New servers start
/// `Unbound` and must call [`ChatServer::bind`] or
/// [`ChatServer::bind_listener`] before running. Each of the `workers`
/// accept loops hands connections to a session task; the server listens for
/// a shutdown signal and then stops accepting and cancels every session.
pub struct ChatServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) router: CommandRouter,
    pub(crate) config: ServerConfig,
    pub(crate) workers: usize,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so a
    /// new sender must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {
    /// Address of the bound listener, if any.
    fn local_addr(&self) -> Option<SocketAddr>;
}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {
    fn local_addr(&self) -> Option<SocketAddr> { None }
}

impl ServerState for Bound {
    fn local_addr(&self) -> Option<SocketAddr> { self.listener.local_addr().ok() }
}

mod builder;
pub mod error;
mod runtime;
mod session_task;

pub use error::ServerError;

#[cfg(test)]
pub(crate) mod test_util;
