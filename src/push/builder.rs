//! Builder for configuring outbound queues.

use super::{DEFAULT_QUEUE_CAPACITY, FrameLike, OutboundQueue, PushConfigError, PushHandle};

/// Builder for [`OutboundQueue`].
///
/// Construct via [`OutboundQueue::builder`] or [`Default::default`]; the
/// capacity defaults to [`DEFAULT_QUEUE_CAPACITY`].
///
/// ```
/// use chatwire::push::{OutboundQueue, PushPolicy};
///
/// let (mut queue, handle) = OutboundQueue::<u8>::builder()
///     .capacity(8)
///     .build()
///     .expect("failed to build queue");
/// handle.try_push(1, PushPolicy::ReturnErrorIfFull).expect("push failed");
/// assert_eq!(queue.try_recv(), Some(1));
/// ```
#[derive(Debug)]
pub struct OutboundQueueBuilder<F> {
    capacity: usize,
    _frame: std::marker::PhantomData<fn() -> F>,
}

impl<F: FrameLike> Default for OutboundQueueBuilder<F> {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            _frame: std::marker::PhantomData,
        }
    }
}

impl<F: FrameLike> OutboundQueueBuilder<F> {
    /// Set the number of frames the queue holds before pushes are refused.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Build the queue and its paired [`PushHandle`].
    ///
    /// # Errors
    ///
    /// Returns [`PushConfigError::InvalidCapacity`] if the capacity is zero or
    /// greater than [`super::MAX_QUEUE_CAPACITY`].
    pub fn build(self) -> Result<(OutboundQueue<F>, PushHandle<F>), PushConfigError> {
        OutboundQueue::build_with_capacity(self.capacity)
    }
}
