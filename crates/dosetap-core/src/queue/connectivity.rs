//! Network reachability as seen by the offline queue.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Answers whether remote delivery is worth attempting right now.
pub trait Connectivity: Send + Sync + fmt::Debug {
    fn is_online(&self) -> bool;
}

/// Connectivity that never goes down.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Connectivity toggled by the host (reachability callbacks, tests).
#[derive(Debug)]
pub struct ConnectivityFlag {
    online: AtomicBool,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
