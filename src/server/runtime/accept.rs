//! Accept-loop utilities for server runtime.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::{AcceptBackoff, ServerConfig},
    router::CommandRouter,
    server::session_task::spawn_session_task,
};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

pub(in crate::server) struct AcceptLoopOptions {
    pub router: CommandRouter,
    pub config: ServerConfig,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
}

/// Accepts incoming connections and spawns a session task for each.
///
/// Failures to accept a connection trigger an exponential back-off governed
/// by the configured [`AcceptBackoff`]. The loop terminates when `shutdown`
/// is cancelled; every spawned session is tracked by `tracker` and observes
/// a child of `shutdown`.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, options: AcceptLoopOptions)
where
    L: AcceptListener + 'static,
{
    let backoff = options.config.accept_backoff();
    let mut delay = backoff.initial();
    while let Some(next_delay) = accept_iteration(&*listener, &options, &backoff, delay).await {
        delay = next_delay;
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_iteration<L>(
    listener: &L,
    options: &AcceptLoopOptions,
    backoff: &AcceptBackoff,
    delay: Duration,
) -> Option<Duration>
where
    L: AcceptListener,
{
    select! {
        biased;

        () = options.shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, _)) => {
                spawn_session_task(
                    stream,
                    options.router.clone(),
                    options.config,
                    options.shutdown.child_token(),
                    &options.tracker,
                );
                backoff.initial()
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                sleep(delay).await;
                backoff.after_failure(delay)
            }
        }),
    }
}
