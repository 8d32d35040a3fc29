//! Mount flag shared with in-flight async work

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-mount "still mounted" flag.
///
/// Cloned into every asynchronous operation started by a node. Once released,
/// whatever those operations produce is discarded (and destroyed if it is a live
/// engine object) instead of being adopted.
#[derive(Debug, Clone)]
pub struct MountGuard {
    mounted: Arc<AtomicBool>,
}

impl MountGuard {
    pub fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A guard that is already released
    pub fn released() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Marks the owning node as unmounted; shared by every clone.
    pub fn release(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }
}

impl Default for MountGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_is_shared_by_clones() {
        let guard = MountGuard::new();
        let captured = guard.clone();
        assert!(captured.is_mounted());

        guard.release();
        assert!(!captured.is_mounted());
        assert!(!MountGuard::released().is_mounted());
    }
}
