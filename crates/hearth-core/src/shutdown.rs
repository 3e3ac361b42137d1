//! Cooperative shutdown flag.
//!
//! A single atomic boolean shared between the accept loop and whatever
//! layer observes termination signals. The listener re-checks it every
//! poll interval, which bounds how long a shutdown request can go
//! unnoticed. Signal handler registration is the embedding binary's
//! concern; the core only exposes the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to the server's running flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    triggered: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Create a flag in the "running" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        assert!(!ShutdownFlag::new().is_triggered());
    }

    #[test]
    fn trigger_is_visible_to_clones() {
        let flag = ShutdownFlag::new();
        let observer = flag.clone();
        flag.trigger();
        assert!(observer.is_triggered());
    }

    #[test]
    fn trigger_is_idempotent() {
        let flag = ShutdownFlag::new();
        flag.trigger();
        flag.trigger();
        assert!(flag.is_triggered());
    }
}
