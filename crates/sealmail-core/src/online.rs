//! Network reachability.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the device currently has network access.
pub trait OnlineProbe: Send + Sync {
    /// Current reachability. Must not block.
    fn is_online(&self) -> bool;
}

/// Reachability flag set by whoever watches the network.
#[derive(Debug)]
pub struct OnlineStatus {
    online: AtomicBool,
}

impl OnlineStatus {
    /// Create a flag with an initial value.
    #[must_use]
    pub const fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Record a reachability change.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for OnlineStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OnlineProbe for OnlineStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
