//! One-shot replies to server requests carried inside signalling events.

use std::{cell::RefCell, fmt};

use derive_more::Display;
use futures::channel::oneshot;

/// Signalling side of a [`Responder`] is gone, so the reply cannot be
/// delivered.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[display(fmt = "Responder's receiving side is dropped")]
pub struct ResponderDroppedError;

/// Acknowledgement callback attached to a server request (`joined` ack,
/// `make-consumer` callback).
///
/// Can be answered at most once, subsequent answers are ignored.
pub struct Responder<T>(RefCell<Option<oneshot::Sender<T>>>);

impl<T> Responder<T> {
    /// Creates a new [`Responder`] and the [`oneshot::Receiver`] its answer
    /// will be delivered into.
    #[must_use]
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self(RefCell::new(Some(tx))), rx)
    }

    /// Answers this [`Responder`] with the provided `value`.
    ///
    /// # Errors
    ///
    /// With [`ResponderDroppedError`] if the receiving side has gone away.
    pub fn respond(&self, value: T) -> Result<(), ResponderDroppedError> {
        match self.0.borrow_mut().take() {
            Some(tx) => tx.send(value).map_err(|_| ResponderDroppedError),
            None => {
                log::debug!("Responder has been already answered");
                Ok(())
            }
        }
    }

    /// Indicates whether this [`Responder`] has been answered already.
    #[inline]
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.0.borrow().is_none()
    }
}

impl<T> fmt::Debug for Responder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Responder")
            .field(&if self.is_answered() { "answered" } else { "pending" })
            .finish()
    }
}
