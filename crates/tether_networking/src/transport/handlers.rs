//! # Handler Tables
//!
//! Subscription bookkeeping shared by transports and the runtime.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Registered handlers plus the id counter.
struct HandlerTable<F: ?Sized> {
    /// Next subscription id.
    next_id: u64,
    /// Handlers in registration order.
    entries: Vec<(u64, Arc<F>)>,
}

/// An ordered table of handlers of one type.
///
/// Cloning yields another handle to the same table.
pub struct HandlerSet<F: ?Sized> {
    inner: Arc<Mutex<HandlerTable<F>>>,
}

impl<F: ?Sized + Send + Sync + 'static> HandlerSet<F> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HandlerTable { next_id: 0, entries: Vec::new() })),
        }
    }

    /// Registers a handler. The returned [`Subscription`] removes it.
    pub fn add(&self, handler: Arc<F>) -> Subscription {
        let id = {
            let mut table = self.inner.lock();
            let id = table.next_id;
            table.next_id += 1;
            table.entries.push((id, handler));
            id
        };

        let table = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(table) = table.upgrade() {
                table.lock().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Returns the current handlers, in registration order.
    ///
    /// Callers invoke the returned handlers after the table lock is gone.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.inner.lock().entries.iter().map(|(_, h)| Arc::clone(h)).collect()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

impl<F: ?Sized + Send + Sync + 'static> Default for HandlerSet<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> Clone for HandlerSet<F> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

/// Handle that removes a registered handler.
///
/// Dropping a `Subscription` leaves the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Creates a subscription that runs `cancel` on unsubscribe.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Removes the handler.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
