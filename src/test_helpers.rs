#![cfg(any(test, feature = "test-helpers"))]
//! Test-only helpers for shared test utilities.
//!
//! [`memory_pair`] builds an in-process [`Channel`] and the peer end used by
//! tests to play the client.

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::{
    channel::Channel,
    codec::MessageCodec,
    message::Message,
};

#[derive(Debug, Default)]
struct Shared {
    inbound: BytesMut,
    outbound: BytesMut,
    peer_closed: bool,
    shut_down: bool,
    write_limit: Option<usize>,
    block_next_write: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Server side of an in-memory connection.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    shared: Arc<Mutex<Shared>>,
}

/// Client side of an in-memory connection.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
    codec: MessageCodec,
}

/// Create a connected channel and peer.
#[must_use]
pub fn memory_pair() -> (MemoryChannel, MemoryPeer) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    (
        MemoryChannel {
            shared: Arc::clone(&shared),
        },
        MemoryPeer {
            shared,
            codec: MessageCodec::default(),
        },
    )
}

impl Channel for MemoryChannel {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = lock(&self.shared);
        if shared.shut_down {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if shared.inbound.is_empty() {
            return if shared.peer_closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(shared.inbound.len());
        buf[..n].copy_from_slice(&shared.inbound[..n]);
        shared.inbound.advance(n);
        Ok(n)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = lock(&self.shared);
        if shared.shut_down || shared.peer_closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if shared.block_next_write {
            shared.block_next_write = false;
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = shared.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        shared.outbound.extend_from_slice(&buf[..n]);
        shared.block_next_write = shared.write_limit.is_some();
        Ok(n)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        lock(&self.shared).shut_down = true;
        Ok(())
    }
}

impl MemoryPeer {
    /// Queue `message` for the server to read.
    pub fn send(&self, message: &Message) {
        let mut shared = lock(&self.shared);
        // Encoding in a test helper only fails for oversized fields.
        let _ = self.codec.encode_into(message, &mut shared.inbound);
    }

    /// Queue raw bytes for the server to read.
    pub fn send_raw(&self, bytes: &[u8]) { lock(&self.shared).inbound.extend_from_slice(bytes); }

    /// Close the client's write side.
    pub fn close(&self) { lock(&self.shared).peer_closed = true; }

    /// Everything the server has written so far, without consuming it.
    #[must_use]
    pub fn received(&self) -> Vec<u8> { lock(&self.shared).outbound.to_vec() }

    /// Decode and remove every complete message the server has written.
    ///
    /// # Panics
    ///
    /// Panics if the server wrote malformed frames.
    #[must_use]
    pub fn take_messages(&self) -> Vec<Message> {
        let mut shared = lock(&self.shared);
        let mut codec = self.codec.clone();
        let mut out = Vec::new();
        while let Some(message) = codec
            .decode(&mut shared.outbound)
            .unwrap_or_else(|err| panic!("server wrote a malformed frame: {err}"))
        {
            out.push(message);
        }
        out
    }

    /// Limit each write to `limit` bytes and block every other write.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        let mut shared = lock(&self.shared);
        shared.write_limit = limit;
        shared.block_next_write = false;
    }

    /// Returns `true` once the server has shut the channel down.
    #[must_use]
    pub fn is_shut_down(&self) -> bool { lock(&self.shared).shut_down }
}
