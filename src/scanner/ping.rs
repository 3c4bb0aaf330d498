use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Port used when falling back to TCP probes. Any SYN makes the kernel resolve
/// the neighbor, so the port itself does not matter.
const TCP_PROBE_PORT: u16 = 80;

const ICMP_PAYLOAD: [u8; 16] = [0; 16];

/// Sweep tuning.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub concurrent_limit: usize,
    pub probe_timeout: Duration,
    /// Upper bound on waiting for all probes to finish.
    pub drain_timeout: Duration,
    /// Pause after the sweep so the OS can finish updating its neighbor cache.
    pub settle_delay: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: 50,
            probe_timeout: Duration::from_millis(500),
            drain_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// How probes reach a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Icmp,
    Tcp,
}

impl std::fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeMethod::Icmp => write!(f, "ICMP"),
            ProbeMethod::Tcp => write!(f, "TCP"),
        }
    }
}

/// A single-shot reachability probe. Returns whether the host answered; the
/// sweep only cares that a packet went out.
#[async_trait]
pub trait Probe: Send + Sync {
    fn method(&self) -> ProbeMethod;

    async fn probe(&self, ip: Ipv4Addr) -> bool;
}

/// ICMP echo probe.
pub struct IcmpProbe {
    client: Client,
    timeout: Duration,
}

impl IcmpProbe {
    pub fn new(timeout: Duration) -> std::io::Result<Self> {
        let client = Client::new(&Config::default())?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Probe for IcmpProbe {
    fn method(&self) -> ProbeMethod {
        ProbeMethod::Icmp
    }

    async fn probe(&self, ip: Ipv4Addr) -> bool {
        let mut pinger = self
            .client
            .pinger(IpAddr::V4(ip), PingIdentifier(rand::random()))
            .await;
        pinger.timeout(self.timeout);

        match pinger.ping(PingSequence(0), &ICMP_PAYLOAD).await {
            Ok(_) => true,
            Err(e) => {
                trace!(%ip, error = %e, "icmp probe failed");
                false
            }
        }
    }
}

/// TCP connect probe, for when ICMP sockets are not permitted.
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn method(&self) -> ProbeMethod {
        ProbeMethod::Tcp
    }

    async fn probe(&self, ip: Ipv4Addr) -> bool {
        let addr = SocketAddr::new(IpAddr::V4(ip), TCP_PROBE_PORT);

        match timeout(self.timeout, tokio::net::TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            // Connection refused means host is alive but port closed
            Ok(Err(e)) => e.kind() == std::io::ErrorKind::ConnectionRefused,
            Err(_) => false,
        }
    }
}

/// ICMP when the process may open an ICMP socket, TCP otherwise.
pub fn system_probe(timeout: Duration) -> Arc<dyn Probe> {
    match IcmpProbe::new(timeout) {
        Ok(probe) => Arc::new(probe),
        Err(e) => {
            debug!(error = %e, "icmp socket unavailable, falling back to tcp probes");
            Arc::new(TcpProbe::new(timeout))
        }
    }
}

/// Outcome of a sweep, for logging only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub dispatched: usize,
    pub answered: usize,
    /// Set when the drain deadline hit before every probe finished.
    pub abandoned: bool,
}

/// Probe every address once, with at most `concurrent_limit` probes in flight.
///
/// Never fails: probe errors and timeouts are dropped. Returns once every probe
/// has finished or `drain_timeout` has elapsed, followed by `settle_delay`.
pub async fn sweep(
    addresses: impl IntoIterator<Item = Ipv4Addr>,
    probe: Arc<dyn Probe>,
    config: &SweepConfig,
) -> SweepSummary {
    let addresses: Vec<Ipv4Addr> = addresses.into_iter().collect();
    let mut summary = SweepSummary {
        dispatched: addresses.len(),
        ..Default::default()
    };
    if addresses.is_empty() {
        return summary;
    }

    let worker_count = config.concurrent_limit.clamp(1, addresses.len());
    let (job_tx, job_rx) = mpsc::channel::<Ipv4Addr>(addresses.len());
    for ip in addresses {
        // Capacity matches the job count, so this never blocks or fails
        let _ = job_tx.try_send(ip);
    }
    drop(job_tx);

    debug!(
        probes = summary.dispatched,
        workers = worker_count,
        method = %probe.method(),
        "starting sweep"
    );

    let shared_rx = Arc::new(Mutex::new(job_rx));
    let mut workers = JoinSet::new();
    for _ in 0..worker_count {
        let rx = Arc::clone(&shared_rx);
        let probe = Arc::clone(&probe);
        let probe_timeout = config.probe_timeout;
        workers.spawn(async move {
            let mut answered = 0usize;
            loop {
                let next_ip = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some(ip) = next_ip else {
                    break;
                };
                if let Ok(true) = timeout(probe_timeout, probe.probe(ip)).await {
                    answered += 1;
                }
            }
            answered
        });
    }

    let drained = timeout(config.drain_timeout, async {
        let mut answered = 0;
        while let Some(result) = workers.join_next().await {
            answered += result.unwrap_or(0);
        }
        answered
    })
    .await;

    match drained {
        Ok(answered) => summary.answered = answered,
        Err(_) => {
            workers.abort_all();
            summary.abandoned = true;
            debug!("sweep drain deadline reached, abandoning outstanding probes");
        }
    }

    tokio::time::sleep(config.settle_delay).await;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Sleeps for a fixed time and records peak concurrency.
    struct SlowProbe {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowProbe {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Probe for SlowProbe {
        fn method(&self) -> ProbeMethod {
            ProbeMethod::Tcp
        }

        async fn probe(&self, ip: Ipv4Addr) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ip.octets()[3] % 2 == 1
        }
    }

    fn hosts(n: u8) -> Vec<Ipv4Addr> {
        (1..=n).map(|i| Ipv4Addr::new(192, 168, 1, i)).collect()
    }

    fn config(limit: usize, probe_ms: u64, drain_ms: u64) -> SweepConfig {
        SweepConfig {
            concurrent_limit: limit,
            probe_timeout: Duration::from_millis(probe_ms),
            drain_timeout: Duration::from_millis(drain_ms),
            settle_delay: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_concurrency_limit() {
        let probe = SlowProbe::new(Duration::from_millis(100));
        let summary = sweep(hosts(5), probe.clone(), &config(2, 1000, 10_000)).await;

        assert_eq!(summary.dispatched, 5);
        assert_eq!(summary.answered, 3);
        assert!(!summary.abandoned);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_with_timeouts_returns_within_drain_wait() {
        // Every probe outlives its own timeout
        let probe = SlowProbe::new(Duration::from_secs(60));
        let cfg = config(2, 200, 5_000);
        let start = Instant::now();
        let summary = sweep(hosts(5), probe, &cfg).await;

        assert_eq!(summary.answered, 0);
        assert!(!summary.abandoned);
        assert!(start.elapsed() <= cfg.drain_timeout + cfg.settle_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_abandons_at_drain_deadline() {
        let probe = SlowProbe::new(Duration::from_secs(60));
        let cfg = config(2, 30_000, 1_000);
        let start = Instant::now();
        let summary = sweep(hosts(5), probe.clone(), &cfg).await;

        assert!(summary.abandoned);
        assert_eq!(summary.answered, 0);
        let elapsed = start.elapsed();
        assert!(elapsed >= cfg.drain_timeout + cfg.settle_delay);
        assert!(elapsed < cfg.drain_timeout + cfg.settle_delay + Duration::from_millis(50));
        // Only the first batch ever started
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_sweep_returns_immediately() {
        let probe = SlowProbe::new(Duration::from_millis(10));
        let start = Instant::now();
        let summary = sweep(Vec::new(), probe, &SweepConfig::default()).await;
        assert_eq!(summary, SweepSummary::default());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
