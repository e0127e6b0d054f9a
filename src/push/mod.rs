//! Bounded outbound queues used for delivering frames to a connection.
//!
//! Every session owns one [`OutboundQueue`]. Other sessions, the router and
//! the wiretap mirror reach it through a cloneable [`PushHandle`] stored in
//! the session registry. Pushes never block: a full queue is handled by the
//! caller's [`PushPolicy`]. Frames are delivered in FIFO order, so frames
//! pushed by a single producer keep their relative order.

use static_assertions::const_assert;
use tokio::sync::mpsc::{self, error::TryRecvError};

mod builder;
mod errors;
mod handle;

pub use builder::OutboundQueueBuilder;
pub use errors::{PushConfigError, PushError};
pub use handle::PushHandle;
pub(crate) use handle::PushHandleInner;

/// Frames that can be sent through a [`PushHandle`].
///
/// Any type that is `Send` and `'static` is a valid frame.
pub trait FrameLike: Send + 'static {}

impl<T> FrameLike for T where T: Send + 'static {}

/// Capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Largest accepted queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

const_assert!(DEFAULT_QUEUE_CAPACITY <= MAX_QUEUE_CAPACITY);

/// Behaviour when a push queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushPolicy {
    /// Return an error to the caller if the queue is full.
    ReturnErrorIfFull,
    /// Drop the frame but emit a log warning.
    WarnAndDropIfFull,
}

/// Receiving end of a connection's outbound queue.
pub struct OutboundQueue<F> {
    pub(crate) rx: mpsc::Receiver<F>,
}

impl<F: FrameLike> OutboundQueue<F> {
    /// Start building a new queue.
    #[must_use]
    pub fn builder() -> OutboundQueueBuilder<F> { OutboundQueueBuilder::default() }

    pub(super) fn build_with_capacity(
        capacity: usize,
    ) -> Result<(Self, PushHandle<F>), PushConfigError> {
        if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
            return Err(PushConfigError::InvalidCapacity(capacity));
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok((Self { rx }, PushHandle::from_inner(PushHandleInner { tx })))
    }

    /// Take the next queued frame without waiting.
    ///
    /// Returns `None` when the queue is empty or closed and drained.
    pub fn try_recv(&mut self) -> Option<F> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.rx.is_empty() }

    /// Stop accepting pushes. Frames already queued can still be received.
    pub fn close(&mut self) { self.rx.close(); }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn frames_are_fifo() {
        let (mut queue, handle) = OutboundQueue::<u8>::builder()
            .capacity(4)
            .build()
            .expect("build");
        for n in 0..4 {
            handle
                .try_push(n, PushPolicy::ReturnErrorIfFull)
                .expect("push");
        }
        let drained: Vec<_> = std::iter::from_fn(|| queue.try_recv()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[rstest]
    #[case(PushPolicy::ReturnErrorIfFull, Err(PushError::QueueFull))]
    #[case(PushPolicy::WarnAndDropIfFull, Ok(()))]
    fn full_queue_follows_policy(
        #[case] policy: PushPolicy,
        #[case] expected: Result<(), PushError>,
    ) {
        let (mut queue, handle) = OutboundQueue::<u8>::builder()
            .capacity(1)
            .build()
            .expect("build");
        handle.try_push(1, policy).expect("first push");
        assert_eq!(handle.try_push(2, policy), expected);
        assert_eq!(queue.try_recv(), Some(1));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn closed_queue_rejects_pushes() {
        let (mut queue, handle) = OutboundQueue::<u8>::builder().build().expect("build");
        queue.close();
        assert_eq!(
            handle.try_push(1, PushPolicy::WarnAndDropIfFull),
            Err(PushError::Closed)
        );
    }

    #[rstest]
    #[case(0)]
    #[case(MAX_QUEUE_CAPACITY + 1)]
    fn rejects_invalid_capacity(#[case] capacity: usize) {
        let result = OutboundQueue::<u8>::builder().capacity(capacity).build();
        assert!(matches!(result, Err(PushConfigError::InvalidCapacity(c)) if c == capacity));
    }
}
