//! Handles that undo exactly one registration side effect.

use parking_lot::Mutex;
use std::fmt;

type DisposeFn = Box<dyn FnOnce() + Send>;

/// A handle whose [`dispose`](Disposable::dispose) reverses one registration.
///
/// Disposal runs the undo action at most once; later calls are no-ops.
/// Dropping a `Disposable` without disposing it keeps the registration
/// alive.
pub struct Disposable {
    action: Mutex<Option<DisposeFn>>,
}

impl Disposable {
    /// Creates a disposable from an undo action.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Creates a disposable that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            action: Mutex::new(None),
        }
    }

    /// Combines several disposables; they are disposed in reverse order.
    #[must_use]
    pub fn from_all(disposables: Vec<Disposable>) -> Self {
        Self::new(move || {
            for disposable in disposables.into_iter().rev() {
                disposable.dispose();
            }
        })
    }

    /// Runs the undo action if it has not run yet.
    pub fn dispose(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    /// Returns true once the undo action has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.action.lock().is_none()
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
