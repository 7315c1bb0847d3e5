use std::future::Future;
use std::time::Duration;

use reqwest::header::CACHE_CONTROL;
use taskdeck_core::clock;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::EngineConfig;
use crate::error::ProbeError;
use crate::state::ConnectivityState;

/// One reachability check against the outside world.
pub trait Probe: Send + Sync {
    fn probe(&self) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

/// Fetches a small, always-available resource. Any HTTP response counts as reachable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ProbeError> {
        Self::new(config.probe_url.clone(), config.probe_timeout())
    }

    /// The probe URL with a `_=<now>` query so no cache can answer for the network.
    fn cache_busted_url(&self, now_ms: i64) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{sep}_={now_ms}", self.url)
    }
}

impl Probe for HttpProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        let now = clock::now_ms().map_err(|e| ProbeError::Network(e.to_string()))?;
        self.client
            .get(self.cache_busted_url(now))
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        Ok(())
    }
}

/// Connectivity events delivered by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSignal {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Offline,
    Online {
        /// The previous state was offline.
        was_offline: bool,
        /// A pending-change flag was cleared. The caller should reconcile.
        cleared_pending: bool,
    },
}

impl ProbeOutcome {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }
}

/// Owns the `online` flag. Probes on a fixed interval and on platform signals.
pub struct ConnectivityMonitor<P> {
    probe: P,
    state: ConnectivityState,
    timeout: Duration,
    interval: Duration,
}

impl<P: Probe> ConnectivityMonitor<P> {
    pub fn new(probe: P, state: ConnectivityState) -> Self {
        let defaults = EngineConfig::default();
        Self::from_config(probe, state, &defaults)
    }

    pub fn from_config(probe: P, state: ConnectivityState, config: &EngineConfig) -> Self {
        Self {
            probe,
            state,
            timeout: config.probe_timeout(),
            interval: config.probe_interval(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    /// Probe once, bounded by the timeout, and update the shared state.
    pub async fn check_now(&self) -> ProbeOutcome {
        let result = match tokio::time::timeout(self.timeout, self.probe.probe()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        };
        match result {
            Ok(()) => self.mark_online(),
            Err(e) => {
                tracing::debug!(error = %e, "connectivity probe failed");
                self.mark_offline()
            }
        }
    }

    /// `Offline` is trusted immediately. `Online` is confirmed with a probe.
    pub async fn handle_platform_signal(&self, signal: PlatformSignal) -> ProbeOutcome {
        tracing::debug!(?signal, "platform connectivity signal");
        match signal {
            PlatformSignal::Offline => self.mark_offline(),
            PlatformSignal::Online => self.check_now().await,
        }
    }

    /// Probe now and then every interval, and react to platform signals, until the
    /// signal channel closes. Each outcome is forwarded to `outcomes` if still open.
    pub async fn run(
        &self,
        mut signals: mpsc::Receiver<PlatformSignal>,
        outcomes: mpsc::UnboundedSender<ProbeOutcome>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let outcome = tokio::select! {
                _ = ticker.tick() => self.check_now().await,
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle_platform_signal(signal).await,
                    None => break,
                },
            };
            let _ = outcomes.send(outcome);
        }
        tracing::debug!("platform signal channel closed, monitor stopped");
    }

    fn mark_online(&self) -> ProbeOutcome {
        let was_online = self.state.set_online(true);
        let cleared_pending = self.state.take_pending();
        if !was_online {
            tracing::info!(cleared_pending, "connectivity restored");
        }
        ProbeOutcome::Online {
            was_offline: !was_online,
            cleared_pending,
        }
    }

    fn mark_offline(&self) -> ProbeOutcome {
        if self.state.set_online(false) {
            tracing::warn!("connectivity lost");
        }
        ProbeOutcome::Offline
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Clone, Default)]
    struct Switch(Arc<AtomicBool>);

    impl Probe for Switch {
        async fn probe(&self) -> Result<(), ProbeError> {
            if self.0.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ProbeError::Network("unreachable".into()))
            }
        }
    }

    struct Hangs;

    impl Probe for Hangs {
        async fn probe(&self) -> Result<(), ProbeError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn failed_probe_keeps_offline() {
        let monitor = ConnectivityMonitor::new(Switch::default(), ConnectivityState::new());
        assert_eq!(monitor.check_now().await, ProbeOutcome::Offline);
        assert!(!monitor.state().is_online());
    }

    #[tokio::test]
    async fn reconnect_clears_pending_flag() {
        let switch = Switch::default();
        let state = ConnectivityState::new();
        let monitor = ConnectivityMonitor::new(switch.clone(), state.clone());

        state.record_local_change();
        switch.0.store(true, Ordering::SeqCst);

        assert_eq!(
            monitor.check_now().await,
            ProbeOutcome::Online { was_offline: true, cleared_pending: true }
        );
        assert!(state.is_online());
        assert!(!state.has_pending_changes());

        assert_eq!(
            monitor.check_now().await,
            ProbeOutcome::Online { was_offline: false, cleared_pending: false }
        );
    }

    #[tokio::test]
    async fn offline_signal_skips_probe() {
        let switch = Switch(Arc::new(AtomicBool::new(true)));
        let monitor = ConnectivityMonitor::new(switch, ConnectivityState::new());
        assert!(monitor.check_now().await.is_online());

        let outcome = monitor.handle_platform_signal(PlatformSignal::Offline).await;
        assert_eq!(outcome, ProbeOutcome::Offline);
        assert!(!monitor.state().is_online());

        let outcome = monitor.handle_platform_signal(PlatformSignal::Online).await;
        assert!(outcome.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_times_out_offline() {
        let state = ConnectivityState::new();
        state.set_online(true);
        let monitor = ConnectivityMonitor::new(Hangs, state.clone())
            .with_timeout(Duration::from_secs(3));

        let started = tokio::time::Instant::now();
        assert_eq!(monitor.check_now().await, ProbeOutcome::Offline);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(!state.is_online());
    }

    #[test]
    fn probe_url_gets_cache_buster() {
        let probe = HttpProbe::new("https://example.com/favicon.ico", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.cache_busted_url(42), "https://example.com/favicon.ico?_=42");

        let probe = HttpProbe::new("https://example.com/ping?x=1", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.cache_busted_url(7), "https://example.com/ping?x=1&_=7");
    }
}
