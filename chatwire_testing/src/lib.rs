//! Utilities for driving a `chatwire` server from tests.
//!
//! [`TestServer`] runs a [`ChatServer`](chatwire::ChatServer) on an
//! ephemeral localhost port and [`TestClient`] speaks the wire protocol to it
//! over TCP.
//!
//! ```rust,no_run
//! use chatwire::{Message, Role};
//! use chatwire_testing::{TestServer, seeded_context};
//!
//! # async fn example() {
//! let server = TestServer::start(seeded_context(&[("alice", Role::User)])).await;
//! let mut alice = server.connect().await;
//! alice.send(Message::signin("alice", "pw")).await;
//! assert_eq!(alice.recv().await, Message::acknowledge("alice", Some("user")));
//! # }
//! ```

pub mod client;
pub mod logging;
pub mod macros;
pub mod server;

pub use chatwire::test_helpers::{MemoryChannel, MemoryPeer, memory_pair};
pub use client::{RECV_TIMEOUT, TestClient};
pub use logging::{LoggerHandle, logger};
pub use server::{SEEDED_SECRET, TestServer, seeded_context};
