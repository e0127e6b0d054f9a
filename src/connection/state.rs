//! Session lifecycle state.

use std::fmt;

/// Lifecycle of a session. Transitions only move forward:
///
/// ```text
/// UNAUTHENTICATED --sign in--> ACTIVE --quit/error--> TERMINATED
///        |                                                ^
///        +------------------quit/error--------------------+
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Unauthenticated,
    Active,
    Terminated,
}

impl SessionState {
    /// Returns `true` once the session can do no further work.
    #[must_use]
    pub fn is_terminated(self) -> bool { self == SessionState::Terminated }

    /// Move to `next` unless that would go backwards.
    pub(super) fn advance(&mut self, next: SessionState) {
        if next > *self {
            *self = next;
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Active => "active",
            SessionState::Terminated => "terminated",
        })
    }
}

/// Result of one [`super::ConnectionSession::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to read or write.
    Idle,
    /// At least one frame was read or some output was written.
    Progressed,
    /// The session has ended; it must not be ticked again.
    Terminated,
}
