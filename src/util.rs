//! Small shared helpers that don't belong to any one layer.

use std::any::Any;

/// Renders a caught panic payload as a human-readable string for
/// [`crate::error::Error::WorkerPanicked`].
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}
