//! Observable holder of the latest [`Session`] snapshot.

use std::cell::Ref;

use futures::{future::LocalBoxFuture, stream::LocalBoxStream};
use medea_reactive::{DroppedError, ObservableCell};

use super::Session;

/// Single source of truth of the [`Session`] state.
///
/// Snapshots are never mutated in place: every [`SessionStore::update()`]
/// derives a new [`Session`] and publishes it to subscribers, unless nothing
/// has changed.
#[derive(Debug)]
pub struct SessionStore(ObservableCell<Session>);

impl SessionStore {
    /// Creates a new [`SessionStore`] holding the provided [`Session`].
    #[inline]
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self(ObservableCell::new(session))
    }

    /// Returns a copy of the latest [`Session`] snapshot.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.0.get()
    }

    /// Returns a reference to the latest [`Session`] snapshot.
    ///
    /// Must not be held across an [`SessionStore::update()`].
    #[inline]
    pub fn borrow(&self) -> Ref<'_, Session> {
        self.0.borrow()
    }

    /// Derives a new [`Session`] snapshot with the provided function and
    /// publishes it.
    pub fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut next = self.0.get();
        let out = f(&mut next);
        self.0.set(next);
        out
    }

    /// Returns [`LocalBoxStream`] of published [`Session`] snapshots,
    /// starting with the current one.
    #[inline]
    pub fn subscribe(&self) -> LocalBoxStream<'static, Session> {
        self.0.subscribe()
    }

    /// Returns a future resolving once a [`Session`] snapshot satisfying the
    /// provided predicate is published (or right away if the current one
    /// does).
    #[inline]
    pub fn when<F>(
        &self,
        predicate: F,
    ) -> LocalBoxFuture<'static, Result<(), DroppedError>>
    where
        F: Fn(&Session) -> bool + 'static,
    {
        self.0.when(predicate)
    }
}
