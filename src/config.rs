//! Server and session configuration.
//!
//! [`ServerConfig`] carries every tunable a session needs. Values are clamped
//! to safe bounds as they are set, so a config handed to a session is always
//! usable.

use std::{num::NonZeroU32, time::Duration};

use crate::{
    codec::{DEFAULT_MAX_FIELD_LENGTH, MessageCodec, NullMarker, clamp_field_length},
    push::{DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY},
};

/// Default period between two ticks of the same session.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(10);

const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);
const MAX_TICK_PERIOD: Duration = Duration::from_secs(1);

const MIN_ACCEPT_DELAY: Duration = Duration::from_millis(1);
const MAX_ACCEPT_DELAY: Duration = Duration::from_secs(30);

/// Retry delays applied when the listener fails to accept a connection.
///
/// The first retry waits [`initial`](Self::initial); each further consecutive
/// failure doubles the wait up to [`max`](Self::max). A successful accept
/// starts over from `initial`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptBackoff {
    initial: Duration,
    max: Duration,
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            max: Duration::from_secs(1),
        }
    }
}

impl AcceptBackoff {
    #[must_use]
    pub fn initial(&self) -> Duration { self.initial }

    #[must_use]
    pub fn max(&self) -> Duration { self.max }

    /// Wait to use after another failure that followed a wait of `delay`.
    #[must_use]
    pub fn after_failure(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.max)
    }
}

/// Tunables shared by the accept loop and every session.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use chatwire::config::ServerConfig;
///
/// let config = ServerConfig::default()
///     .with_tick_period(Duration::from_millis(5))
///     .with_queue_capacity(64);
/// assert_eq!(config.queue_capacity(), 64);
/// assert!(config.inbound_rate().is_none());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    tick_period: Duration,
    queue_capacity: usize,
    max_field_length: usize,
    null_marker: NullMarker,
    inbound_rate: Option<NonZeroU32>,
    accept_backoff: AcceptBackoff,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_field_length: DEFAULT_MAX_FIELD_LENGTH,
            null_marker: NullMarker::default(),
            inbound_rate: None,
            accept_backoff: AcceptBackoff::default(),
        }
    }
}

impl ServerConfig {
    /// Period between ticks, clamped to 1 ms ..= 1 s.
    #[must_use]
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period.clamp(MIN_TICK_PERIOD, MAX_TICK_PERIOD);
        self
    }

    /// Capacity of each session's outbound queue, clamped to
    /// `1..=MAX_QUEUE_CAPACITY`.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        self
    }

    /// Largest accepted field, in bytes.
    #[must_use]
    pub fn with_max_field_length(mut self, len: usize) -> Self {
        self.max_field_length = clamp_field_length(len);
        self
    }

    #[must_use]
    pub fn with_null_marker(mut self, marker: NullMarker) -> Self {
        self.null_marker = marker;
        self
    }

    /// Limit each session to `per_second` inbound frames. `None` disables the
    /// limit.
    #[must_use]
    pub fn with_inbound_rate(mut self, per_second: Option<NonZeroU32>) -> Self {
        self.inbound_rate = per_second;
        self
    }

    /// Accept retry delays. `initial` is clamped to 1 ms ..= 30 s and `max`
    /// to `initial ..= 30 s`.
    #[must_use]
    pub fn with_accept_backoff(mut self, initial: Duration, max: Duration) -> Self {
        let initial = initial.clamp(MIN_ACCEPT_DELAY, MAX_ACCEPT_DELAY);
        self.accept_backoff = AcceptBackoff {
            initial,
            max: max.clamp(initial, MAX_ACCEPT_DELAY),
        };
        self
    }

    #[must_use]
    pub fn tick_period(&self) -> Duration { self.tick_period }

    #[must_use]
    pub fn queue_capacity(&self) -> usize { self.queue_capacity }

    #[must_use]
    pub fn max_field_length(&self) -> usize { self.max_field_length }

    #[must_use]
    pub fn null_marker(&self) -> NullMarker { self.null_marker }

    #[must_use]
    pub fn inbound_rate(&self) -> Option<NonZeroU32> { self.inbound_rate }

    #[must_use]
    pub fn accept_backoff(&self) -> AcceptBackoff { self.accept_backoff }

    /// Codec configured with this config's framing limits.
    #[must_use]
    pub fn codec(&self) -> MessageCodec {
        MessageCodec::new(self.max_field_length).with_null_marker(self.null_marker)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::codec::{MAX_FIELD_LENGTH, MIN_FIELD_LENGTH};

    #[rstest]
    #[case(Duration::ZERO, MIN_TICK_PERIOD)]
    #[case(Duration::from_millis(25), Duration::from_millis(25))]
    #[case(Duration::from_secs(60), MAX_TICK_PERIOD)]
    fn tick_period_is_clamped(#[case] input: Duration, #[case] expected: Duration) {
        assert_eq!(ServerConfig::default().with_tick_period(input).tick_period(), expected);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(16, 16)]
    #[case(usize::MAX, MAX_QUEUE_CAPACITY)]
    fn queue_capacity_is_clamped(#[case] input: usize, #[case] expected: usize) {
        assert_eq!(
            ServerConfig::default().with_queue_capacity(input).queue_capacity(),
            expected
        );
    }

    #[rstest]
    #[case(Duration::ZERO, Duration::ZERO, MIN_ACCEPT_DELAY, MIN_ACCEPT_DELAY)]
    #[case(Duration::from_millis(5), Duration::from_millis(1), Duration::from_millis(5), Duration::from_millis(5))]
    #[case(Duration::from_millis(5), Duration::from_secs(3600), Duration::from_millis(5), MAX_ACCEPT_DELAY)]
    fn accept_backoff_is_clamped(
        #[case] initial: Duration,
        #[case] max: Duration,
        #[case] expected_initial: Duration,
        #[case] expected_max: Duration,
    ) {
        let backoff = ServerConfig::default()
            .with_accept_backoff(initial, max)
            .accept_backoff();
        assert_eq!((backoff.initial(), backoff.max()), (expected_initial, expected_max));
    }

    #[test]
    fn accept_backoff_doubles_up_to_max() {
        let backoff = ServerConfig::default()
            .with_accept_backoff(Duration::from_millis(5), Duration::from_millis(12))
            .accept_backoff();
        let first = backoff.initial();
        let second = backoff.after_failure(first);
        assert_eq!(second, Duration::from_millis(10));
        assert_eq!(backoff.after_failure(second), Duration::from_millis(12));
    }

    #[test]
    fn codec_follows_config() {
        let config = ServerConfig::default()
            .with_max_field_length(1)
            .with_null_marker(NullMarker::NegativeLength);
        let codec = config.codec();
        assert_eq!(codec.max_field_length(), MIN_FIELD_LENGTH);
        assert_eq!(codec.null_marker(), NullMarker::NegativeLength);

        let config = ServerConfig::default().with_max_field_length(usize::MAX);
        assert_eq!(config.max_field_length(), MAX_FIELD_LENGTH);
    }
}
