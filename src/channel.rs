//! Non-blocking byte channels driven by the session tick.
//!
//! A [`Channel`] never parks the calling thread. Reads and writes that cannot
//! make progress report [`io::ErrorKind::WouldBlock`], which callers treat as
//! "nothing to do this tick".

use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use futures::task::noop_waker_ref;
use tokio::{io::AsyncWrite, net::TcpStream};

/// Bidirectional, non-blocking byte channel.
pub trait Channel: Send {
    /// Read whatever bytes are available into `buf`.
    ///
    /// `Ok(0)` means the peer closed its write side.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::WouldBlock`] when no bytes are ready, or any
    /// other I/O error reported by the transport.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as many bytes of `buf` as the transport accepts right now.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::WouldBlock`] when the transport cannot accept
    /// any bytes.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Close both directions of the channel.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the transport.
    fn shutdown(&mut self) -> io::Result<()>;

    /// Remote address, when the transport has one.
    fn peer_addr(&self) -> Option<SocketAddr> { None }
}

/// Accepted sockets stay registered with the runtime's reactor, so readiness
/// observed while the session task waits for its next tick is reused here.
impl Channel for TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> { TcpStream::try_read(self, buf) }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> { TcpStream::try_write(self, buf) }

    /// Shut down the write half; the read half closes when the stream drops.
    fn shutdown(&mut self) -> io::Result<()> {
        let mut cx = Context::from_waker(noop_waker_ref());
        match Pin::new(self).poll_shutdown(&mut cx) {
            Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Poll::Ready(result) => result,
            Poll::Pending => Ok(()),
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> { TcpStream::peer_addr(self).ok() }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> { (**self).try_read(buf) }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> { (**self).try_write(buf) }

    fn shutdown(&mut self) -> io::Result<()> { (**self).shutdown() }

    fn peer_addr(&self) -> Option<SocketAddr> { (**self).peer_addr() }
}

/// Returns `true` when `err` only means the operation should be retried later.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let client = TcpStream::connect(addr).await.expect("connect");
        let (server, _) = listener.accept().await.expect("accept");
        (client, server)
    }

    #[tokio::test]
    async fn tcp_stream_reports_would_block_when_idle() {
        let (mut client, mut server) = connected_pair().await;

        let mut buf = [0_u8; 8];
        let err = Channel::try_read(&mut server, &mut buf).expect_err("nothing to read");
        assert!(is_transient(&err));

        client.write_all(b"hi").await.expect("write");
        let mut read = 0;
        while read == 0 {
            server.readable().await.expect("readable");
            match Channel::try_read(&mut server, &mut buf) {
                Ok(n) => read = n,
                Err(e) if is_transient(&e) => {}
                Err(e) => panic!("read failed: {e}"),
            }
        }
        assert_eq!(&buf[..read], b"hi");
        assert!(Channel::peer_addr(&server).is_some());
    }

    #[tokio::test]
    async fn shutdown_signals_end_of_stream() {
        let (mut client, mut server) = connected_pair().await;
        server.writable().await.expect("writable");
        let written = Channel::try_write(&mut server, b"bye").expect("write");
        assert_eq!(written, 3);
        Channel::shutdown(&mut server).expect("shutdown");

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.expect("read");
        assert_eq!(received, b"bye");
    }
}
