//! Runtime control for [`ChatServer`].

mod accept;
#[cfg(test)]
mod tests;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
use futures::Future;
use log::{info, warn};
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, ChatServer, ServerError};

impl ChatServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use chatwire::{context::ServerContext, server::ChatServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), chatwire::server::ServerError> {
    /// let server = ChatServer::new(Arc::new(ServerContext::in_memory()))
    ///     .bind(([127, 0, 0, 1], 5555).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    ///
    /// use chatwire::{context::ServerContext, server::ChatServer};
    ///
    /// async fn try_run() {
    ///     ChatServer::new(Arc::new(ServerContext::in_memory()))
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors; the signature leaves room for fatal runtime
    /// failures.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// All accept loops stop, every session task is cancelled, and the call
    /// returns once they have finished.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use chatwire::{context::ServerContext, server::ChatServer};
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), chatwire::server::ServerError> {
    /// let server = ChatServer::new(Arc::new(ServerContext::in_memory()))
    ///     .bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(async move {
    ///     server
    ///         .run_with_shutdown(async {
    ///             let _ = rx.await;
    ///         })
    ///         .await
    /// });
    ///
    /// let _ = tx.send(());
    /// handle
    ///     .await
    ///     .expect("join server task")
    ///     .expect("server run failed");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let ChatServer {
            router,
            config,
            workers,
            ready_tx,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        if let Ok(addr) = listener.local_addr() {
            info!("chat server listening: addr={addr}, workers={workers}");
        }

        for _ in 0..workers {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                AcceptLoopOptions {
                    router: router.clone(),
                    config,
                    shutdown: shutdown_token.clone(),
                    tracker: tracker.clone(),
                },
            ));
        }

        // Signal readiness after all workers have been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        info!("chat server stopped");
        Ok(())
    }
}
