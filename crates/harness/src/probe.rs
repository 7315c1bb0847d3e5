use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskdeck_engine::{Probe, ProbeError};

/// Scriptable reachability: flip it on and off, optionally make it hang.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    reachable: Arc<AtomicBool>,
    hang: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// A hanging probe never answers; the monitor's timeout decides.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Probe for FakeProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Network("fake network down".into()))
        }
    }
}
