//! Buffered framing on top of a non-blocking [`Channel`].
//!
//! [`FramedChannel`] owns a read buffer fed by [`FramedChannel::fill`] and a
//! write buffer drained by [`FramedChannel::flush`]. Neither ever blocks: a
//! partially written frame stays buffered until the next flush, so frames
//! leave the channel in the order they were written.

use std::{io, net::SocketAddr};

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::Decoder;

use crate::{
    channel::{Channel, is_transient},
    codec::{CodecError, FramingError, MessageCodec},
    message::Message,
};

const READ_CHUNK: usize = 4096;

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameIoError {
    /// No complete frame is buffered yet.
    #[error("no complete frame available")]
    NoFrameAvailable,
    /// The peer closed the channel.
    #[error("stream closed")]
    StreamClosed,
    /// The inbound bytes are malformed.
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// The transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<CodecError> for FrameIoError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Framing(e) => Self::Framing(e),
            CodecError::Io(e) => Self::Io(e),
        }
    }
}

/// A [`Channel`] paired with the message codec and its buffers.
pub struct FramedChannel<C> {
    channel: C,
    codec: MessageCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    read_limit: usize,
    eof: bool,
    closed: bool,
}

impl<C: Channel> FramedChannel<C> {
    /// Wrap `channel`, buffering at most one maximal frame of inbound data.
    pub fn new(channel: C, codec: MessageCodec) -> Self {
        let read_limit = codec.max_field_length().saturating_mul(3).saturating_add(64);
        Self {
            channel,
            codec,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            read_limit,
            eof: false,
            closed: false,
        }
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.channel.peer_addr() }

    #[must_use]
    pub fn codec(&self) -> &MessageCodec { &self.codec }

    /// Read available bytes until the channel would block, a complete frame
    /// is buffered, or the read buffer is full. Returns the bytes read.
    ///
    /// # Errors
    ///
    /// Returns [`FrameIoError::Framing`] for malformed input and
    /// [`FrameIoError::Io`] for transport failures.
    pub fn fill(&mut self) -> Result<usize, FrameIoError> {
        let mut total = 0;
        let mut chunk = [0_u8; READ_CHUNK];
        while !self.eof && self.read_buf.len() < self.read_limit {
            if self.codec.frame_len(&self.read_buf)?.is_some() {
                break;
            }
            let room = (self.read_limit - self.read_buf.len()).min(READ_CHUNK);
            match self.channel.try_read(&mut chunk[..room]) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if is_transient(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    /// Returns `true` when a complete frame is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError`] when the buffered bytes are malformed.
    pub fn has_frame(&self) -> Result<bool, FramingError> {
        Ok(self.codec.frame_len(&self.read_buf)?.is_some())
    }

    /// Take the next buffered message.
    ///
    /// # Errors
    ///
    /// Returns [`FrameIoError::NoFrameAvailable`] when more bytes are needed
    /// and [`FrameIoError::StreamClosed`] once the peer has closed and no
    /// frame remains.
    pub fn next_message(&mut self) -> Result<Message, FrameIoError> {
        let decoded = if self.eof {
            self.codec.decode_eof(&mut self.read_buf)?
        } else {
            self.codec.decode(&mut self.read_buf)?
        };
        match decoded {
            Some(message) => Ok(message),
            None if self.eof => Err(FrameIoError::StreamClosed),
            None => Err(FrameIoError::NoFrameAvailable),
        }
    }

    /// Encode `message` behind any pending output and try to flush.
    ///
    /// Returns `true` when everything buffered has been written.
    ///
    /// # Errors
    ///
    /// Returns [`FrameIoError::Framing`] if the message cannot be encoded and
    /// [`FrameIoError::Io`] if the transport fails.
    pub fn write(&mut self, message: &Message) -> Result<bool, FrameIoError> {
        self.codec.encode_into(message, &mut self.write_buf)?;
        self.flush()
    }

    /// Write as much pending output as the channel accepts.
    ///
    /// Returns `true` when the write buffer is empty.
    ///
    /// # Errors
    ///
    /// Returns [`FrameIoError::Io`] if the transport fails or accepts zero
    /// bytes.
    pub fn flush(&mut self) -> Result<bool, FrameIoError> {
        while !self.write_buf.is_empty() {
            match self.channel.try_write(&self.write_buf) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if is_transient(&e) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    #[must_use]
    pub fn has_pending_writes(&self) -> bool { !self.write_buf.is_empty() }

    #[must_use]
    pub fn is_eof(&self) -> bool { self.eof }

    /// Shut the channel down. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying shutdown.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.channel.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::memory_pair;

    #[test]
    fn reads_frames_in_order() {
        let (channel, peer) = memory_pair();
        let mut framed = FramedChannel::new(channel, MessageCodec::default());
        peer.send_raw(b"HLO 1 a 2 -- 2 --\nBYE 1 a 2 -- 2 --");

        framed.fill().expect("fill");
        assert!(framed.has_frame().expect("scan"));
        assert_eq!(framed.next_message().expect("frame"), Message::hello("a", None));
        assert!(framed.next_message().expect("frame").is_quit());
        assert!(matches!(
            framed.next_message(),
            Err(FrameIoError::NoFrameAvailable)
        ));
    }

    #[test]
    fn closed_peer_reports_stream_closed() {
        let (channel, peer) = memory_pair();
        let mut framed = FramedChannel::new(channel, MessageCodec::default());
        peer.close();
        framed.fill().expect("fill");
        assert!(matches!(framed.next_message(), Err(FrameIoError::StreamClosed)));
    }

    #[test]
    fn close_mid_frame_is_truncation() {
        let (channel, peer) = memory_pair();
        let mut framed = FramedChannel::new(channel, MessageCodec::default());
        peer.send_raw(b"BCT 1 a 2");
        peer.close();
        framed.fill().expect("fill");
        assert!(matches!(
            framed.next_message(),
            Err(FrameIoError::Framing(FramingError::Truncated { .. }))
        ));
    }

    #[test]
    fn partial_writes_are_resumed() {
        let (channel, peer) = memory_pair();
        peer.set_write_limit(Some(5));
        let mut framed = FramedChannel::new(channel, MessageCodec::default());

        let done = framed.write(&Message::quit("a")).expect("write");
        assert!(!done);
        assert!(framed.has_pending_writes());
        while !framed.flush().expect("flush") {}
        assert_eq!(peer.received(), b"BYE 1 a 2 -- 2 --");
    }

    #[test]
    fn close_is_idempotent() {
        let (channel, peer) = memory_pair();
        let mut framed = FramedChannel::new(channel, MessageCodec::default());
        framed.close().expect("close");
        framed.close().expect("close again");
        assert!(peer.is_shut_down());
    }
}
