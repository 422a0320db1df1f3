//! Connection Registry
//!
//! Every live connection, keyed by its id. Each operation takes the lock
//! once and finishes under it, so a snapshot plus its broadcast (or a
//! removal plus its `peerClose`) is never interleaved with another event.

use chrono::{DateTime, Utc};
use fair_relay_auth::Identity;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::metrics::RelayMetrics;

use super::error::RelayError;
use super::protocol::{ServerMessage, Signal};

/// Outbound queue feeding one connection's socket writer.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// One live transport-level session.
#[derive(Debug)]
pub struct ConnectionRecord {
    outbox: Outbox,
    /// Present once a valid token was presented
    identity: Option<Identity>,
    connected_at: DateTime<Utc>,
}

impl ConnectionRecord {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

pub struct Registry {
    connections: RwLock<HashMap<String, ConnectionRecord>>,
    metrics: Arc<RelayMetrics>,
}

impl Registry {
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Insert a fresh, unauthenticated record and return its id.
    pub async fn register(&self, outbox: Outbox) -> String {
        let mut connections = self.connections.write().await;
        let id = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if !connections.contains_key(&candidate) {
                break candidate;
            }
        };
        connections.insert(
            id.clone(),
            ConnectionRecord {
                outbox,
                identity: None,
                connected_at: Utc::now(),
            },
        );
        id
    }

    /// Remove a connection and tell everyone else it left.
    /// Returns false if the id was not registered.
    pub async fn unregister(&self, id: &str) -> bool {
        let mut connections = self.connections.write().await;
        let Some(record) = connections.remove(id) else {
            return false;
        };
        debug!(
            conn_id = %id,
            lifetime_secs = (Utc::now() - record.connected_at).num_seconds(),
            "Connection removed from registry"
        );
        let msg = ServerMessage::PeerClose {
            peer: id.to_string(),
        };
        self.broadcast_locked(&connections, id, &msg);
        true
    }

    /// Attach a verified identity, reply with the current roster, and
    /// announce the newcomer to every other connection.
    pub async fn authenticate(&self, id: &str, identity: Identity) -> Result<(), RelayError> {
        let mut connections = self.connections.write().await;
        let record = connections
            .get_mut(id)
            .ok_or_else(|| RelayError::PeerNotFound(id.to_string()))?;
        if record.is_authenticated() {
            return Err(RelayError::AlreadyAuthenticated);
        }
        record.identity = Some(identity.clone());

        let user_infos: BTreeMap<String, Identity> = connections
            .iter()
            .filter_map(|(peer_id, r)| r.identity.clone().map(|i| (peer_id.clone(), i)))
            .collect();
        let roster = ServerMessage::Users {
            myid: id.to_string(),
            users: user_infos.keys().cloned().collect(),
            user_infos,
        };
        if let Some(record) = connections.get(id) {
            self.deliver(id, &record.outbox, roster);
        }

        let joined = ServerMessage::NewUser {
            peer_id: id.to_string(),
            user_info: identity,
        };
        self.broadcast_locked(&connections, id, &joined);
        Ok(())
    }

    /// Forward a negotiation message from an authenticated sender to `to`.
    pub async fn relay(&self, from: &str, to: &str, signal: Signal) -> Result<(), RelayError> {
        let connections = self.connections.read().await;
        let sender_ok = connections
            .get(from)
            .is_some_and(ConnectionRecord::is_authenticated);
        if !sender_ok {
            return Err(RelayError::NotAuthenticated);
        }
        let target = connections
            .get(to)
            .ok_or_else(|| RelayError::PeerNotFound(to.to_string()))?;

        if self.deliver(to, &target.outbox, signal.from_peer(from.to_string())) {
            self.metrics.message_relayed();
        }
        Ok(())
    }

    pub async fn is_authenticated(&self, id: &str) -> bool {
        self.connections
            .read()
            .await
            .get(id)
            .is_some_and(ConnectionRecord::is_authenticated)
    }

    #[cfg(test)]
    pub async fn identity(&self, id: &str) -> Option<Identity> {
        self.connections
            .read()
            .await
            .get(id)
            .and_then(|r| r.identity.clone())
    }

    #[cfg(test)]
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn authenticated_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|r| r.is_authenticated())
            .count()
    }

    /// Send `msg` to every connection except `except`, authenticated or not.
    fn broadcast_locked(
        &self,
        connections: &HashMap<String, ConnectionRecord>,
        except: &str,
        msg: &ServerMessage,
    ) {
        let mut delivered = 0;
        for (peer_id, record) in connections.iter().filter(|(peer_id, _)| *peer_id != except) {
            if self.deliver(peer_id, &record.outbox, msg.clone()) {
                delivered += 1;
            }
        }
        self.metrics.broadcast_sent(delivered);
    }

    /// Never awaits: a slow reader loses messages instead of stalling the registry.
    fn deliver(&self, id: &str, outbox: &Outbox, msg: ServerMessage) -> bool {
        match outbox.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn_id = %id, "Outbound queue full, dropping message");
                self.metrics.message_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(conn_id = %id, "Outbound queue closed, dropping message");
                self.metrics.message_dropped();
                false
            }
        }
    }
}
