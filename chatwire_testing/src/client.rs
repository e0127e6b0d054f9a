//! TCP client speaking the wire protocol.

use std::{net::SocketAddr, time::Duration};

use chatwire::{Message, MessageCodec};
use futures::{SinkExt, StreamExt};
use tokio::{io::AsyncWriteExt, net::TcpStream, time::timeout};
use tokio_util::codec::Framed;

/// How long [`TestClient::recv`] waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Client end of one connection to a test server.
pub struct TestClient {
    framed: Framed<TcpStream, MessageCodec>,
}

impl TestClient {
    /// Connect to `addr` using the default codec.
    ///
    /// # Panics
    ///
    /// Panics if the connection cannot be established.
    pub async fn connect(addr: SocketAddr) -> Self { Self::connect_with(addr, MessageCodec::default()).await }

    /// Connect to `addr` using `codec` for both directions.
    ///
    /// # Panics
    ///
    /// Panics if the connection cannot be established.
    pub async fn connect_with(addr: SocketAddr, codec: MessageCodec) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .unwrap_or_else(|e| panic!("connect to {addr} failed: {e}"));
        Self {
            framed: Framed::new(stream, codec),
        }
    }

    /// Encode and send one message.
    ///
    /// # Panics
    ///
    /// Panics if the message cannot be encoded or written.
    pub async fn send(&mut self, message: Message) {
        let kind = message.kind();
        self.framed
            .send(message)
            .await
            .unwrap_or_else(|e| panic!("sending {kind} failed: {e}"));
    }

    /// Write raw bytes, bypassing the encoder.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await.expect("raw write failed");
        stream.flush().await.expect("raw flush failed");
    }

    /// Receive the next message.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`RECV_TIMEOUT`], the server closes
    /// the connection, or the bytes do not decode.
    pub async fn recv(&mut self) -> Message {
        match timeout(RECV_TIMEOUT, self.framed.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => panic!("undecodable frame from server: {e}"),
            Ok(None) => panic!("server closed the connection"),
            Err(_) => panic!("no frame within {RECV_TIMEOUT:?}"),
        }
    }

    /// Receive `n` messages in arrival order.
    pub async fn recv_n(&mut self, n: usize) -> Vec<Message> {
        let mut messages = Vec::with_capacity(n);
        for _ in 0..n {
            messages.push(self.recv().await);
        }
        messages
    }

    /// Receive a message if one arrives within `wait`.
    pub async fn recv_within(&mut self, wait: Duration) -> Option<Message> {
        match timeout(wait, self.framed.next()).await {
            Ok(Some(Ok(message))) => Some(message),
            _ => None,
        }
    }

    /// Sign in with `HLO name secret` and return the server's reply.
    pub async fn sign_in(&mut self, name: &str, secret: &str) -> Message {
        self.send(Message::signin(name, secret)).await;
        self.recv().await
    }

    /// Wait for the server to close the connection, discarding any frames
    /// that arrive first. Returns `false` if it is still open after `wait`.
    pub async fn closed_within(&mut self, wait: Duration) -> bool {
        let result = timeout(wait, async {
            while let Some(Ok(_)) = self.framed.next().await {}
        })
        .await;
        result.is_ok()
    }
}
