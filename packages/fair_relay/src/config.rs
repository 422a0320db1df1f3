use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / fair-relay.toml / env vars)
// =============================================================================
//
// Equivalent ways to configure:
//
//   fair-relay.toml:  [auth]
//                     secret = "..."
//
//   env var:          FAIR_AUTH__SECRET=...   (double underscore = nesting)
//
//   port only:        PORT=4000               (deployment platforms set this)

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "fair-relay.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub auth: AuthFileConfig,
}

/// Listener tunables (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_message_kb")]
    pub max_message_kb: usize,
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_message_kb: default_max_message_kb(),
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

/// Token verification tunables (lives under `[auth]`).
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthFileConfig {
    /// Shared HS256 secret. There is deliberately no default.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    #[serde(default)]
    pub leeway_secs: u64,
}

impl Default for AuthFileConfig {
    fn default() -> Self {
        Self {
            secret: None,
            auth_timeout_secs: default_auth_timeout_secs(),
            leeway_secs: 0,
        }
    }
}

impl std::fmt::Debug for AuthFileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFileConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("auth_timeout_secs", &self.auth_timeout_secs)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4000
}
fn default_max_message_kb() -> usize {
    64
}
fn default_send_queue_capacity() -> usize {
    128
}
fn default_auth_timeout_secs() -> u64 {
    30
}

/// Defaults layered under the TOML file. No environment.
pub fn file_layers(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(FileConfig::default())).merge(Toml::file(path))
}

/// Build a figment that layers: defaults → TOML file → FAIR_* env vars → PORT.
///
/// Env vars use double-underscore for nesting into sections:
///   `FAIR_AUTH__SECRET=s3cret`  →  `auth.secret = "s3cret"`
///   `FAIR_SERVER__MAX_MESSAGE_KB=16`  →  `server.max_message_kb = 16`
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::providers::Env;

    file_layers(config_path)
        .merge(Env::prefixed("FAIR_").split("__"))
        .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
}

// =============================================================================
// Runtime config (validated view used by the server)
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no token secret configured (set FAIR_AUTH__SECRET or [auth].secret)")]
    MissingSecret,
    #[error("invalid listen address {0}")]
    InvalidAddress(String),
    #[error("send_queue_capacity must be at least 1")]
    ZeroQueueCapacity,
}

#[derive(Clone)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    /// Largest inbound frame accepted by the transport
    pub max_message_bytes: usize,
    /// Outbound queue bound per connection
    pub send_queue_capacity: usize,
    pub auth: AuthConfig,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    /// None = unauthenticated connections may idle forever
    pub auth_timeout: Option<Duration>,
    pub leeway_secs: u64,
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self, ConfigError> {
        let addr = format!("{}:{}", fc.server.host, fc.server.port);
        let listen_addr = addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidAddress(addr))?;

        if fc.server.send_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        Ok(Self {
            listen_addr,
            max_message_bytes: fc.server.max_message_kb * 1024,
            send_queue_capacity: fc.server.send_queue_capacity,
            auth: AuthConfig::from_file(&fc.auth)?,
        })
    }
}

impl AuthConfig {
    pub fn from_file(fc: &AuthFileConfig) -> Result<Self, ConfigError> {
        let secret = fc
            .secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingSecret)?
            .to_string();

        Ok(Self {
            secret,
            auth_timeout: if fc.auth_timeout_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(fc.auth_timeout_secs))
            },
            leeway_secs: fc.leeway_secs,
        })
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("auth_timeout", &self.auth_timeout)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}
