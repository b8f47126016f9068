//! Cooperative cancellation shared by everything the lifecycle starts.
//!
//! The token is a clone-able handle around one `AtomicBool`.  Long-running
//! loops check [`ShutdownToken::is_cancelled`] between units of work, the
//! same way a background thread checks a `running` flag.  Cancelling is
//! one-way: there is no reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token.  Returns `true` if this call did the cancelling.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_not_cancelled() {
        assert!(!ShutdownToken::new().is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        // Arrange
        let token = ShutdownToken::new();
        let clone = token.clone();

        // Act
        token.cancel();

        // Assert
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_only_first_cancel_reports_true() {
        let token = ShutdownToken::new();
        assert!(token.cancel());
        assert!(!token.cancel());
    }
}
