//! Cloneable handle used by producers to push frames to a connection.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::warn;

use super::{FrameLike, PushError, PushPolicy};

/// Shared state for [`PushHandle`].
pub(crate) struct PushHandleInner<F> {
    pub(crate) tx: mpsc::Sender<F>,
}

/// Cloneable handle used by producers to push frames to a connection.
pub struct PushHandle<F>(Arc<PushHandleInner<F>>);

impl<F> Clone for PushHandle<F> {
    fn clone(&self) -> Self { Self(Arc::clone(&self.0)) }
}

impl<F: FrameLike> PushHandle<F> {
    pub(crate) fn from_inner(inner: PushHandleInner<F>) -> Self { Self(Arc::new(inner)) }

    pub(crate) fn from_arc(arc: Arc<PushHandleInner<F>>) -> Self { Self(arc) }

    /// Attempt to push a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::QueueFull`] if the queue is full and the policy is
    /// [`PushPolicy::ReturnErrorIfFull`]. Returns [`PushError::Closed`] if the
    /// receiving end has been closed or dropped.
    pub fn try_push(&self, frame: F, policy: PushPolicy) -> Result<(), PushError> {
        match self.0.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => match policy {
                PushPolicy::ReturnErrorIfFull => Err(PushError::QueueFull),
                PushPolicy::WarnAndDropIfFull => {
                    warn!(
                        capacity = self.0.tx.max_capacity(),
                        "push queue full, frame dropped"
                    );
                    Ok(())
                }
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PushError::Closed),
        }
    }

    /// Downgrade to a `Weak` reference for storage in a registry.
    pub(crate) fn downgrade(&self) -> Weak<PushHandleInner<F>> { Arc::downgrade(&self.0) }
}
