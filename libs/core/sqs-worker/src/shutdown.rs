//! Graceful shutdown coordination
//!
//! `ShutdownCoordinator` fans a single shutdown request out to every
//! scheduler through a `watch` channel. The first reason recorded wins.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Why draining started
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ShutdownReason {
    /// OS signal (SIGHUP, SIGTERM, SIGINT)
    Signal(String),
    /// Programmatic request
    Requested,
    /// A lifecycle subscriber failed
    SubscriberFailure(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {name}"),
            ShutdownReason::Requested => f.write_str("shutdown requested"),
            ShutdownReason::SubscriberFailure(e) => write!(f, "subscriber failed: {e}"),
        }
    }
}

/// Shutdown coordinator shared by the binary and its schedulers
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receiver that observes the shutdown reason once set
    pub fn subscribe(&self) -> watch::Receiver<Option<ShutdownReason>> {
        self.tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Relaxed)
    }

    /// Current reason, if shutdown has begun
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.tx.borrow().clone()
    }

    /// Initiate shutdown, idempotent
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(reason = %reason, "Initiating graceful shutdown");
            self.tx.send_replace(Some(reason));
        }
    }

    /// Wait for SIGINT, SIGTERM or SIGHUP, then initiate shutdown
    pub async fn wait_for_signal(&self) {
        let reason = wait_for_os_signal().await;
        self.shutdown(ShutdownReason::Signal(reason.to_string()));
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_os_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = unix_signal(signal::unix::SignalKind::terminate());
    #[cfg(unix)]
    let hangup = unix_signal(signal::unix::SignalKind::hangup());

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
        _ = hangup => "SIGHUP",
    }
}

#[cfg(unix)]
async fn unix_signal(kind: signal::unix::SignalKind) {
    match signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}
