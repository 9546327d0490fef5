//! Somewhat convenient wrappers around functions used as callbacks.

use std::{cell::RefCell, fmt, rc::Rc};

/// Wrapper for a single argument function.
pub struct Callback1<A> {
    f: RefCell<Option<Rc<dyn Fn(A)>>>,
}

impl<A> Default for Callback1<A> {
    #[inline]
    fn default() -> Self {
        Self {
            f: RefCell::new(None),
        }
    }
}

impl<A> Callback1<A> {
    /// Sets inner function.
    #[inline]
    pub fn set_func<F>(&self, f: F)
    where
        F: Fn(A) + 'static,
    {
        self.f.borrow_mut().replace(Rc::new(f));
    }

    /// Indicates whether callback is set.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.f.borrow().is_some()
    }

    /// Invokes inner function if any.
    ///
    /// Returns `false` if no callback is set.
    ///
    /// The function is cloned out before the invocation, so it may freely
    /// replace itself.
    pub fn call1<T: Into<A>>(&self, arg: T) -> bool {
        let f = self.f.borrow().clone();
        match f {
            Some(f) => {
                (f)(arg.into());
                true
            }
            None => false,
        }
    }
}

impl<A> fmt::Debug for Callback1<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback1")
            .field("is_set", &self.is_set())
            .finish()
    }
}
