//! Live WebSocket connections, bounded globally and per client address.
//!
//! The registry lives as long as the server. Closing it signals every open
//! connection to wind down; guards release their slot when dropped.

use crate::metrics::ServerMetrics;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionRejection {
    GlobalLimit,
    PerIpLimit,
    Closed,
}

#[derive(Default)]
struct Tracker {
    total: usize,
    per_ip: HashMap<IpAddr, usize>,
}

struct Inner {
    tracker: Mutex<Tracker>,
    max_total: Option<usize>,
    max_per_ip: Option<usize>,
    closing: watch::Sender<bool>,
    metrics: Arc<ServerMetrics>,
}

#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

pub struct ConnectionGuard {
    inner: Arc<Inner>,
    ip: IpAddr,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut tracker = self.inner.tracker();
        tracker.total = tracker.total.saturating_sub(1);
        if let Some(count) = tracker.per_ip.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                tracker.per_ip.remove(&self.ip);
            }
        }
    }
}

impl Inner {
    fn tracker(&self) -> MutexGuard<'_, Tracker> {
        match self.tracker.lock() {
            Ok(tracker) => tracker,
            Err(poisoned) => {
                tracing::warn!("connection tracker lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl ConnectionRegistry {
    pub fn new(
        max_total: Option<usize>,
        max_per_ip: Option<usize>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tracker: Mutex::new(Tracker::default()),
                max_total,
                max_per_ip,
                closing,
                metrics,
            }),
        }
    }

    pub fn try_acquire(&self, ip: IpAddr) -> Result<ConnectionGuard, ConnectionRejection> {
        if *self.inner.closing.borrow() {
            return Err(ConnectionRejection::Closed);
        }
        let mut tracker = self.inner.tracker();
        if let Some(limit) = self.inner.max_total {
            if tracker.total >= limit {
                self.inner.metrics.inc_ws_connection_reject_global();
                return Err(ConnectionRejection::GlobalLimit);
            }
        }
        let current_ip = tracker.per_ip.get(&ip).copied().unwrap_or(0);
        if let Some(limit) = self.inner.max_per_ip {
            if current_ip >= limit {
                self.inner.metrics.inc_ws_connection_reject_per_ip();
                return Err(ConnectionRejection::PerIpLimit);
            }
        }
        tracker.total = tracker.total.saturating_add(1);
        tracker.per_ip.insert(ip, current_ip.saturating_add(1));
        Ok(ConnectionGuard {
            inner: Arc::clone(&self.inner),
            ip,
        })
    }

    pub fn active(&self) -> usize {
        self.inner.tracker().total
    }

    /// Resolves once the registry is closed.
    pub fn closing(&self) -> watch::Receiver<bool> {
        self.inner.closing.subscribe()
    }

    /// Refuse new connections and ask open ones to close.
    pub fn close_all(&self) {
        self.inner.closing.send_replace(true);
        tracing::info!(active = self.active(), "closing websocket connections");
    }
}
