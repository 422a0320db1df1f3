//! Relay metrics for observability
//!
//! Counters for connection churn, authentication outcomes, and signaling traffic.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::relay::ErrorCategory;

/// Relay-wide metrics
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since start
    pub total_connections: AtomicU64,

    // Auth metrics
    pub auth_succeeded: AtomicU64,
    pub auth_failed: AtomicU64,
    /// Connections closed for not authenticating in time
    pub auth_timeouts: AtomicU64,

    // Message metrics
    /// Text frames received from clients
    pub messages_received: AtomicU64,
    /// Offer/answer/ice messages delivered to a target
    pub messages_relayed: AtomicU64,
    /// newUser/peerClose notifications queued
    pub broadcasts_sent: AtomicU64,
    /// Messages dropped because a recipient's queue was full or closed
    pub messages_dropped: AtomicU64,

    // Error metrics
    pub protocol_errors: AtomicU64,
    pub permission_errors: AtomicU64,
    pub routing_misses: AtomicU64,
    pub websocket_errors: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn auth_succeeded(&self) {
        self.auth_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_relayed(&self) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_sent(&self, recipients: u64) {
        self.broadcasts_sent.fetch_add(recipients, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn websocket_error(&self) {
        self.websocket_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an error reported back to a client.
    pub fn record_error(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::Protocol => &self.protocol_errors,
            ErrorCategory::Auth => &self.auth_failed,
            ErrorCategory::Permission => &self.permission_errors,
            ErrorCategory::Routing => &self.routing_misses,
            ErrorCategory::Timeout => &self.auth_timeouts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            auth: AuthMetrics {
                succeeded: self.auth_succeeded.load(Ordering::Relaxed),
                failed: self.auth_failed.load(Ordering::Relaxed),
                timed_out: self.auth_timeouts.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                relayed: self.messages_relayed.load(Ordering::Relaxed),
                broadcast: self.broadcasts_sent.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                protocol: self.protocol_errors.load(Ordering::Relaxed),
                permission: self.permission_errors.load(Ordering::Relaxed),
                routing: self.routing_misses.load(Ordering::Relaxed),
                websocket: self.websocket_errors.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub auth: AuthMetrics,
    pub messages: MessageMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthMetrics {
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub relayed: u64,
    pub broadcast: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub protocol: u64,
    pub permission: u64,
    pub routing: u64,
    pub websocket: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub authenticated: u64,
    pub uptime_secs: u64,
}
