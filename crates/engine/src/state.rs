use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide connectivity and pending-change flags.
///
/// Cloning hands out another view of the same flags. The store, the monitor and the
/// sync orchestrator each hold one; reads never block.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityState {
    flags: Arc<Flags>,
}

#[derive(Debug, Default)]
struct Flags {
    online: AtomicBool,
    pending_sync: AtomicBool,
}

impl ConnectivityState {
    /// Starts offline with nothing pending; the first probe decides.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.flags.online.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.flags.online.swap(online, Ordering::AcqRel)
    }

    /// Something changed locally while offline. Coarse: no record of what.
    pub fn has_pending_changes(&self) -> bool {
        self.flags.pending_sync.load(Ordering::Acquire)
    }

    /// Flag a local mutation. Only counts while offline; returns whether it flagged.
    pub fn record_local_change(&self) -> bool {
        if self.is_online() {
            return false;
        }
        self.flags.pending_sync.store(true, Ordering::Release);
        true
    }

    /// Clear the pending flag, returning whether it was set.
    pub fn take_pending(&self) -> bool {
        self.flags.pending_sync.swap(false, Ordering::AcqRel)
    }
}
