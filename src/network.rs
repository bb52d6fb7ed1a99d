//! Connectivity classification for the sync engine's offline gate.
//!
//! Raw platform signals are folded into a [`NetworkStatus`] and debounced so
//! that a flapping link does not thrash the engine. The monitor never starts
//! fetches; the engine pulls [`NetworkMonitor::is_offline`] at decision points.
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Platform;

/// Updates closer together than this are dropped
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Physical link type as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionKind {
    Wifi,
    Cellular,
    Ethernet,
    Bluetooth,
    Vpn,
    Other,
    None,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellularGeneration {
    G2,
    G3,
    G4,
    G5,
}

impl CellularGeneration {
    fn is_fast(self) -> bool {
        matches!(self, CellularGeneration::G4 | CellularGeneration::G5)
    }
}

/// Unclassified connectivity signal. `None` means the platform doesn't know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawConnectivity {
    pub is_connected: Option<bool>,
    pub kind: ConnectionKind,
    pub internet_reachable: Option<bool>,
    pub cellular_generation: Option<CellularGeneration>,
}

impl RawConnectivity {
    pub fn offline() -> Self {
        Self {
            is_connected: Some(false),
            kind: ConnectionKind::None,
            internet_reachable: Some(false),
            cellular_generation: None,
        }
    }

    pub fn wifi() -> Self {
        Self {
            is_connected: Some(true),
            kind: ConnectionKind::Wifi,
            internet_reachable: Some(true),
            cellular_generation: None,
        }
    }

    pub fn cellular(generation: Option<CellularGeneration>) -> Self {
        Self {
            is_connected: Some(true),
            kind: ConnectionKind::Cellular,
            internet_reachable: Some(true),
            cellular_generation: generation,
        }
    }
}

/// Classified connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    pub connected: bool,
    pub kind: ConnectionKind,
    pub internet_reachable: Option<bool>,
    /// Good enough to fetch proactively
    pub is_fast: bool,
}

impl Default for NetworkStatus {
    /// Optimistic until the first signal arrives.
    fn default() -> Self {
        Self {
            connected: true,
            kind: ConnectionKind::Unknown,
            internet_reachable: Some(true),
            is_fast: true,
        }
    }
}

impl NetworkStatus {
    /// Classify a raw signal under `platform`'s rules.
    pub fn classify(raw: &RawConnectivity, platform: Platform) -> Self {
        let link_up = raw.is_connected == Some(true);
        let connected = if platform.strict_reachability() {
            link_up && raw.internet_reachable != Some(false)
        } else {
            link_up
        };

        Self {
            connected,
            kind: raw.kind,
            internet_reachable: raw.internet_reachable,
            is_fast: classify_speed(raw, platform),
        }
    }

    pub fn is_offline(&self) -> bool {
        !self.connected
    }

    pub fn is_wifi(&self) -> bool {
        self.kind == ConnectionKind::Wifi
    }

    pub fn is_cellular(&self) -> bool {
        self.kind == ConnectionKind::Cellular
    }
}

fn classify_speed(raw: &RawConnectivity, platform: Platform) -> bool {
    if raw.is_connected != Some(true) {
        return false;
    }
    match raw.kind {
        ConnectionKind::Wifi if platform.strict_reachability() => {
            raw.internet_reachable == Some(true)
        }
        ConnectionKind::Wifi => true,
        ConnectionKind::Cellular => raw
            .cellular_generation
            .map(CellularGeneration::is_fast)
            .unwrap_or(false),
        _ => raw.internet_reachable != Some(false),
    }
}

// ============================================================================
// Monitor
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Tracked {
    status: NetworkStatus,
    accepted_at: Option<Instant>,
    /// Latest reading dropped by the debounce, applied once the window closes
    pending: Option<NetworkStatus>,
}

impl Tracked {
    fn in_window(&self, now: Instant, debounce: Duration) -> bool {
        self.accepted_at
            .is_some_and(|at| now.saturating_duration_since(at) < debounce)
    }
}

/// Debounced, shareable view of current connectivity.
#[derive(Clone)]
pub struct NetworkMonitor {
    platform: Platform,
    debounce: Duration,
    state: Arc<watch::Sender<Tracked>>,
}

impl NetworkMonitor {
    pub fn new(platform: Platform) -> Self {
        let (tx, _rx) = watch::channel(Tracked {
            status: NetworkStatus::default(),
            accepted_at: None,
            pending: None,
        });
        Self {
            platform,
            debounce: DEFAULT_DEBOUNCE,
            state: Arc::new(tx),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn status(&self) -> NetworkStatus {
        self.settle();
        self.state.borrow().status
    }

    /// Promote a debounced reading whose window has passed.
    fn settle(&self) {
        let now = Instant::now();
        let debounce = self.debounce;
        let promoted = self.state.send_if_modified(|tracked| {
            if tracked.pending.is_none() || tracked.in_window(now, debounce) {
                return false;
            }
            match tracked.pending.take() {
                Some(status) => {
                    tracked.status = status;
                    tracked.accepted_at = Some(now);
                    true
                }
                None => false,
            }
        });
        if promoted {
            tracing::debug!("Applied debounced connectivity update");
        }
    }

    pub fn is_offline(&self) -> bool {
        self.status().is_offline()
    }

    /// Apply a raw signal. Returns `false` if the debounce held it back; the
    /// latest held-back reading takes effect once the window has passed.
    pub fn observe(&self, raw: RawConnectivity) -> bool {
        let now = Instant::now();
        let status = NetworkStatus::classify(&raw, self.platform);
        let debounce = self.debounce;

        let accepted = self.state.send_if_modified(|tracked| {
            if tracked.in_window(now, debounce) {
                tracked.pending = Some(status);
                return false;
            }
            tracked.status = status;
            tracked.accepted_at = Some(now);
            tracked.pending = None;
            true
        });

        if accepted {
            tracing::debug!(
                connected = status.connected,
                kind = ?status.kind,
                fast = status.is_fast,
                "Connectivity updated"
            );
        } else {
            tracing::trace!("Connectivity update debounced");
        }
        accepted
    }

    /// A probe failed outright; assume offline. Not subject to the debounce.
    pub fn mark_unreachable(&self) {
        self.state.send_modify(|tracked| {
            tracked.status.connected = false;
            tracked.status.internet_reachable = Some(false);
            tracked.status.is_fast = false;
            tracked.accepted_at = Some(Instant::now());
            tracked.pending = None;
        });
        tracing::debug!("Connectivity probe failed, marking offline");
    }

    /// Feed the monitor until `cancel` fires.
    ///
    /// Probes once on start, then applies pushed `signals` and, if
    /// `poll_interval` is set, re-probes periodically.
    pub async fn watch(
        &self,
        probe: Arc<dyn ConnectivityProbe>,
        mut signals: mpsc::Receiver<RawConnectivity>,
        poll_interval: Option<Duration>,
        cancel: CancellationToken,
    ) {
        self.check(probe.as_ref()).await;

        let mut ticker = poll_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });
        let mut signals_open = true;

        loop {
            let tick = async {
                match ticker.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                signal = signals.recv(), if signals_open => match signal {
                    Some(raw) => {
                        self.observe(raw);
                    }
                    None => signals_open = false,
                },
                _ = tick => {
                    self.check(probe.as_ref()).await;
                }
            }
        }
        tracing::debug!("Connectivity watcher stopped");
    }

    /// Probe once and apply the result. Returns whether the link is usable.
    pub async fn check(&self, probe: &dyn ConnectivityProbe) -> bool {
        match probe.current().await {
            Ok(raw) => {
                self.observe(raw);
                raw.is_connected == Some(true) && raw.internet_reachable != Some(false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to check connectivity");
                self.mark_unreachable();
                false
            }
        }
    }
}

// ============================================================================
// Probes
// ============================================================================

/// Source of on-demand connectivity readings.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn current(&self) -> anyhow::Result<RawConnectivity>;
}

/// Always reports the same reading.
pub struct StaticProbe(pub RawConnectivity);

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn current(&self) -> anyhow::Result<RawConnectivity> {
        Ok(self.0)
    }
}

/// Reachability by opening a TCP connection to the news endpoint's host.
pub struct EndpointProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl EndpointProbe {
    pub fn from_base_url(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let url = url::Url::parse(base_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("base URL has no host: {base_url}"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("base URL has no port: {base_url}"))?;
        Ok(Self {
            host,
            port,
            timeout,
        })
    }
}

#[async_trait]
impl ConnectivityProbe for EndpointProbe {
    async fn current(&self) -> anyhow::Result<RawConnectivity> {
        let connect = tokio::net::TcpStream::connect((self.host.as_str(), self.port));
        let reachable = matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)));
        Ok(RawConnectivity {
            is_connected: Some(reachable),
            kind: if reachable {
                ConnectionKind::Unknown
            } else {
                ConnectionKind::None
            },
            internet_reachable: Some(reachable),
            cellular_generation: None,
        })
    }
}
