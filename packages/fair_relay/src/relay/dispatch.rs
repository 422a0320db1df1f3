//! Message dispatcher.
//!
//! Maps each inbound `ClientMessage` onto a registry operation. Kept free of
//! socket handling so the session loop and the tests drive the same code.

use fair_relay_auth::TokenAuthority;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::RelayMetrics;

use super::error::RelayError;
use super::protocol::{ClientMessage, Signal};
use super::registry::Registry;

/// Relay-wide state handed to every connection.
#[derive(Clone)]
pub struct RelayContext {
    pub registry: Arc<Registry>,
    pub tokens: Arc<TokenAuthority>,
    pub metrics: Arc<RelayMetrics>,
    /// Unauthenticated connections are closed after this long (None = never)
    pub auth_timeout: Option<Duration>,
    pub send_queue_capacity: usize,
    /// Cancelled on process shutdown; sessions close when it fires
    pub shutdown: CancellationToken,
}

impl RelayContext {
    pub fn new(
        tokens: TokenAuthority,
        metrics: Arc<RelayMetrics>,
        auth_timeout: Option<Duration>,
        send_queue_capacity: usize,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::new(metrics.clone())),
            tokens: Arc::new(tokens),
            metrics,
            auth_timeout,
            send_queue_capacity,
            shutdown: CancellationToken::new(),
        }
    }
}

/// What a successfully handled message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Authenticated,
    Relayed,
}

pub async fn dispatch_message(
    ctx: &RelayContext,
    conn_id: &str,
    msg: ClientMessage,
) -> Result<Dispatched, RelayError> {
    match msg {
        ClientMessage::Auth { token } => authenticate(ctx, conn_id, &token).await,
        ClientMessage::Offer { to, offer } => relay(ctx, conn_id, &to, Signal::Offer(offer)).await,
        ClientMessage::Answer { to, answer } => {
            relay(ctx, conn_id, &to, Signal::Answer(answer)).await
        }
        ClientMessage::Ice { to, ice } => relay(ctx, conn_id, &to, Signal::Ice(ice)).await,
    }
}

async fn authenticate(
    ctx: &RelayContext,
    conn_id: &str,
    token: &str,
) -> Result<Dispatched, RelayError> {
    if ctx.registry.is_authenticated(conn_id).await {
        return Err(RelayError::AlreadyAuthenticated);
    }

    let identity = ctx.tokens.verify(token).inspect_err(|e| {
        warn!(conn_id = %conn_id, reason = %e, "Authentication failed");
    })?;
    let name = identity.name.clone();

    ctx.registry.authenticate(conn_id, identity).await?;
    ctx.metrics.auth_succeeded();
    info!(conn_id = %conn_id, name = %name, "Peer authenticated");
    Ok(Dispatched::Authenticated)
}

async fn relay(
    ctx: &RelayContext,
    conn_id: &str,
    to: &str,
    signal: Signal,
) -> Result<Dispatched, RelayError> {
    let kind = signal.kind();
    ctx.registry.relay(conn_id, to, signal).await?;
    debug!(conn_id = %conn_id, to = %to, kind, "Relayed signal");
    Ok(Dispatched::Relayed)
}
