#![doc(html_root_url = "https://docs.rs/chatwire/latest")]
//! Public API for the `chatwire` library.
//!
//! This crate provides the core of an instant-messaging server: a
//! length-prefixed text wire protocol, non-blocking sessions driven by a
//! periodic tick, role-based command routing and an agency wiretap workflow.

pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod directory;
pub mod error;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod push;
pub mod role;
pub mod router;
pub mod server;
pub mod session;
pub mod test_helpers;
pub mod transport;
pub mod wiretap;

pub use codec::{MessageCodec, NullMarker};
pub use config::ServerConfig;
pub use connection::{ConnectionSession, SessionState, TickOutcome};
pub use context::ServerContext;
/// Result type alias for session-level operations.
pub use error::{Result, SessionError};
pub use message::{Message, MessageType};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED, WIRETAP_MIRRORS};
pub use role::Role;
pub use router::CommandRouter;
pub use server::{ChatServer, ServerError};
pub use session::{ConnectionId, SessionRegistry};
