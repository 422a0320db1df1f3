use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns relay status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = &state.relay.registry;
    let connections = registry.len().await as u64;
    let authenticated = registry.authenticated_count().await as u64;
    let snapshot = state.relay.metrics.snapshot();

    Json(metrics::HealthStatus {
        status: health_label(&snapshot).to_string(),
        connections,
        authenticated,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Transport errors degrade health. Dropped messages do not: a closed outbox
/// during an ordinary disconnect race counts as a drop.
fn health_label(snapshot: &metrics::MetricsSnapshot) -> &'static str {
    if snapshot.errors.websocket == 0 {
        "healthy"
    } else {
        "degraded"
    }
}

/// Metrics endpoint - returns detailed relay counters
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RelayMetrics;

    #[test]
    fn dropped_messages_stay_healthy() {
        let m = RelayMetrics::new();
        m.message_dropped();
        m.message_dropped();
        assert_eq!(health_label(&m.snapshot()), "healthy");
    }

    #[test]
    fn websocket_errors_degrade() {
        let m = RelayMetrics::new();
        assert_eq!(health_label(&m.snapshot()), "healthy");
        m.websocket_error();
        assert_eq!(health_label(&m.snapshot()), "degraded");
    }
}
