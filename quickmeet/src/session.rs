use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::info;

/// Per-watcher session flags.
///
/// Nothing here survives the process; `reset` runs whenever the dialog is
/// known to have closed or the page navigated.
#[derive(Debug, Default)]
pub struct SessionState {
    injected: AtomicBool,
    resets: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_injected(&self) -> bool {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn mark_injected(&self) {
        self.injected.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self, reason: &str) {
        if self.injected.swap(false, Ordering::SeqCst) {
            info!(reason, "session reset");
        }
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of resets so far, injected or not
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}
