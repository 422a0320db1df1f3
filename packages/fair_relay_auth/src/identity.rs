//! The identity a peer presents to the rest of the fair.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AuthError;

/// Decoded, verified claims describing a connected peer.
///
/// `name` is the only claim the relay requires. Every other claim the
/// backend put in the token is kept as-is in `extra` and shown to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Map::new(),
        }
    }

    /// Attach an additional claim (club, role, avatar url, ...).
    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        if self.name.trim().is_empty() {
            return Err(AuthError::MissingName);
        }
        Ok(())
    }
}
