use anyhow::{Context, Result, bail};
use axum::{Router, routing::get};
use clap::{Parser, Subcommand};
use fair_relay_auth::{Identity, TokenAuthority};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod handlers;
mod metrics;
mod relay;

use crate::config::{AuthConfig, FileConfig, RelayConfig, load_config};
use crate::metrics::RelayMetrics;
use crate::relay::RelayContext;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "fair-relay")]
#[command(about = "WebRTC signaling relay for the virtual club fair")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server (default)
    Serve(ServeArgs),

    /// Mint a token signed with the configured secret (for local testing)
    Token(TokenArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Config file (defaults to ./fair-relay.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct TokenArgs {
    /// Config file holding the shared secret
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Display name shown to other peers
    #[arg(short, long)]
    name: String,

    /// Lifetime in seconds
    #[arg(long, default_value = "3600")]
    ttl_secs: u32,

    /// Extra claim as key=value (value parsed as JSON when possible)
    #[arg(long = "claim")]
    claims: Vec<String>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub relay: RelayContext,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        let tokens = TokenAuthority::new(config.auth.secret.as_bytes(), config.auth.leeway_secs);
        let relay = RelayContext::new(
            tokens,
            Arc::new(RelayMetrics::new()),
            config.auth.auth_timeout,
            config.send_queue_capacity,
        );
        Self {
            relay,
            config: Arc::new(config),
        }
    }
}

pub(crate) fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::relay_websocket_handler))
        .route("/ws", get(handlers::relay_websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => run_server(ServeArgs::default()).await,
        Some(Commands::Serve(args)) => run_server(args).await,
        Some(Commands::Token(args)) => mint_token(args),
    }
}

async fn run_server(args: ServeArgs) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "fair_relay=debug,tower_http=debug,info"
    } else {
        "fair_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting fair signaling relay");

    let mut file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    if let Some(host) = args.host {
        file_config.server.host = host;
    }
    if let Some(port) = args.port {
        file_config.server.port = port;
    }
    let config = RelayConfig::from_file(&file_config).context("Invalid configuration")?;

    match config.auth.auth_timeout {
        Some(t) => info!("Unauthenticated connections close after {}s", t.as_secs()),
        None => warn!("Authentication timeout disabled"),
    }

    let listen_addr = config.listen_addr;
    let state = AppState::new(config);
    let shutdown = state.relay.shutdown.clone();

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("Signaling relay listening on ws://{}/", actual_addr);
    info!("  GET /health   - Relay status");
    info!("  GET /metrics  - Relay counters");

    let server_result = axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error");

    info!("Shutdown complete");
    server_result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal, closing connections...");
}

fn mint_token(args: TokenArgs) -> Result<()> {
    let file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    let auth = AuthConfig::from_file(&file_config.auth)?;

    let mut identity = Identity::new(args.name);
    for raw in &args.claims {
        let (key, value) = parse_claim(raw)?;
        identity = identity.with_claim(key, value);
    }

    let token = TokenAuthority::new(auth.secret.as_bytes(), 0)
        .issue(identity, chrono::Duration::seconds(i64::from(args.ttl_secs)))
        .context("Failed to mint token")?;
    println!("{token}");
    Ok(())
}

/// `key=value`; the value is JSON if it parses as JSON, otherwise a string.
fn parse_claim(raw: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("claim must look like key=value: {raw}");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("claim key is empty: {raw}");
    }
    if matches!(key, "name" | "exp" | "iat" | "nbf") {
        bail!("claim {key} is managed by the token command");
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
