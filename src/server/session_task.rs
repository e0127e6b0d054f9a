//! Per-connection task that ticks a [`ConnectionSession`].

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::{
    net::TcpStream,
    select,
    time::{self, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, warn};

use crate::{
    config::ServerConfig,
    connection::{ConnectionSession, TickOutcome},
    panic::format_panic,
    router::CommandRouter,
};

/// Spawn a task driving the session for `stream` until it terminates or
/// `shutdown` is cancelled.
///
/// Panics inside the session are caught and logged so one misbehaving
/// connection cannot bring down its worker.
pub(super) fn spawn_session_task(
    stream: TcpStream,
    router: CommandRouter,
    config: ServerConfig,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) {
    let peer_addr = stream.peer_addr().ok();
    tracker.spawn(async move {
        let fut = AssertUnwindSafe(drive_session(stream, router, config, shutdown)).catch_unwind();
        if let Err(panic) = fut.await {
            let panic_msg = format_panic(panic);
            // Emit via both `log` and `tracing` so either subscriber sees it.
            log::error!("session task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
            error!(panic = %panic_msg, ?peer_addr, "session task panicked");
        }
    });
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn drive_session(
    stream: TcpStream,
    router: CommandRouter,
    config: ServerConfig,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY");
    }
    let mut session = match ConnectionSession::new(stream, router, &config) {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "rejecting connection: invalid session configuration");
            return;
        }
    };
    let mut ticker = time::interval(config.tick_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        select! {
            biased;

            () = shutdown.cancelled() => {
                debug!(connection = %session.id(), "session cancelled by shutdown");
                break;
            }
            _ = ticker.tick() => {
                if session.tick() == TickOutcome::Terminated {
                    break;
                }
            }
        }
    }
}
