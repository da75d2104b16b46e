use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

type Callback = Arc<dyn Fn(bool) + Send + Sync>;

/// Single-slot availability-change callback.
///
/// The callback runs synchronously on the polling thread with the new
/// availability flag. It must return quickly.
#[derive(Default)]
pub struct StatusNotifier {
    slot: Mutex<Option<Callback>>,
}

impl StatusNotifier {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`, replacing any previous one.
    pub fn set(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        *self.slot.lock() = Some(Arc::new(callback));
    }

    /// Drop the registered callback.
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    /// Whether a callback is registered.
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Invoke the registered callback, if any. A panicking callback is logged
    /// and swallowed.
    pub fn notify(&self, available: bool) {
        // Clone out of the slot so the callback may re-register itself.
        let callback = self.slot.lock().clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(available))).is_err() {
                log::error!("Status-changed callback panicked");
            }
        }
    }
}
