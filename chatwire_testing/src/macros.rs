//! Assertion macros shared by test helpers and integration tests.

/// Receive the next message on a [`TestClient`](crate::TestClient) and
/// assert its type, returning the message.
#[macro_export]
macro_rules! recv_kind {
    ($client:expr, $kind:expr) => {{
        let message = $client.recv().await;
        assert_eq!(
            message.kind(),
            $kind,
            "unexpected frame at {}:{}: {:?}",
            file!(),
            line!(),
            message
        );
        message
    }};
}

/// Assert that a client receives nothing for a short while.
#[macro_export]
macro_rules! assert_silent {
    ($client:expr) => {{
        $crate::assert_silent!($client, ::std::time::Duration::from_millis(100))
    }};
    ($client:expr, $wait:expr) => {{
        if let Some(message) = $client.recv_within($wait).await {
            panic!("expected silence at {}:{}, got {:?}", file!(), line!(), message);
        }
    }};
}

pub use crate::{assert_silent, recv_kind};
