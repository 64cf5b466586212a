//! Process-wide network reachability state.
//!
//! One [`ConnectivityMonitor`] exists per process. It owns the only writer of the
//! shared flag; every [`Connectivity`] handle is a read-only view of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use reqwest::Url;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Cheap, cloneable read handle on the connectivity flag.
#[derive(Debug, Clone)]
pub struct Connectivity {
    online: Arc<AtomicBool>,
}

impl Connectivity {
    pub fn online() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Stores the new value and returns the previous one.
    pub(crate) fn replace(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::AcqRel)
    }
}

/// Where and how often the monitor checks reachability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    target: String,
    interval: Duration,
    timeout: Duration,
}

impl Probe {
    pub fn new(target: impl Into<String>, interval: Duration) -> Self {
        Self {
            target: target.into(),
            interval,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Probes the `host:port` of the configured endpoint.
    pub fn for_base_url(base: &str) -> Option<Self> {
        let url = Url::parse(base.trim()).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(Self::new(format!("{host}:{port}"), DEFAULT_PROBE_INTERVAL))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// One TCP connect attempt against the target, bounded by the timeout.
    pub async fn reachable(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await,
            Ok(Ok(_))
        )
    }
}

struct Running {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ConnectivityMonitor {
    state: Connectivity,
    started: AtomicBool,
    running: Mutex<Option<Running>>,
}

static GLOBAL_MONITOR: OnceLock<ConnectivityMonitor> = OnceLock::new();

impl ConnectivityMonitor {
    pub(crate) fn new() -> Self {
        Self {
            state: Connectivity::online(),
            started: AtomicBool::new(false),
            running: Mutex::new(None),
        }
    }

    /// The process-wide monitor. It assumes connectivity until its first probe.
    pub fn global() -> &'static Self {
        GLOBAL_MONITOR.get_or_init(Self::new)
    }

    pub fn state(&self) -> Connectivity {
        self.state.clone()
    }

    /// Spawns the observer task on the current tokio runtime.
    ///
    /// Returns `false` without doing anything if the monitor was started
    /// before; a stopped monitor is never restarted.
    pub fn start(&self, probe: Probe) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            return false;
        }
        let token = CancellationToken::new();
        let task = tokio::spawn(observe(probe, self.state.clone(), token.clone()));
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(Running { token, task });
        true
    }

    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Running { token, task }) = running {
            token.cancel();
            drop(task);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }
}

async fn observe(probe: Probe, state: Connectivity, token: CancellationToken) {
    debug!(target = probe.target(), "Connectivity monitor started");
    loop {
        let online = tokio::select! {
            () = token.cancelled() => break,
            online = probe.reachable() => online,
        };
        if state.replace(online) != online {
            info!(online, target = probe.target(), "Connectivity changed");
        }
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(probe.interval) => {}
        }
    }
    debug!(target = probe.target(), "Connectivity monitor stopped");
}
