//! Active session counting and RAII guard.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global gauge tracking live sessions.
static ACTIVE_SESSIONS: AtomicU64 = AtomicU64::new(0);

/// RAII guard incrementing [`ACTIVE_SESSIONS`] on creation and decrementing
/// it on drop.
pub(super) struct ActiveSession;

impl ActiveSession {
    pub(super) fn new() -> Self {
        ACTIVE_SESSIONS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_connections();
        Self
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        ACTIVE_SESSIONS.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_connections();
    }
}

/// Return the current number of live sessions.
#[must_use]
pub fn active_session_count() -> u64 { ACTIVE_SESSIONS.load(Ordering::Relaxed) }
