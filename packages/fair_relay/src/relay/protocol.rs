//! Signaling Protocol Types
//!
//! JSON envelopes exchanged with browser clients. Every frame is an object
//! whose `kind` field selects the variant.

use fair_relay_auth::Identity;
use serde::Serialize;
use serde_json::error::Category;
use serde_json::value::RawValue;
use std::collections::BTreeMap;

use super::error::RelayError;

/// Negotiation payload held as the exact JSON text the sender wrote.
///
/// Never decoded: key order, whitespace and number spelling reach the
/// target unchanged.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Payload(Box<RawValue>);

impl Payload {
    /// Stand-in for an omitted `ice` field.
    pub fn null() -> Self {
        Self(RawValue::NULL.to_owned())
    }

    pub fn get(&self) -> &str {
        self.0.get()
    }
}

impl From<&RawValue> for Payload {
    fn from(raw: &RawValue) -> Self {
        Self(raw.to_owned())
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for Payload {}

#[cfg(test)]
impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self(serde_json::value::to_raw_value(&value).expect("JSON value serializes"))
    }
}

/// Messages sent FROM the client TO the relay
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Present a signed token
    Auth { token: String },
    /// Session description offer for peer `to`
    Offer { to: String, offer: Payload },
    /// Session description answer for peer `to`
    Answer { to: String, answer: Payload },
    /// ICE candidate for peer `to`; null marks end of candidates
    Ice { to: String, ice: Payload },
}

/// Messages sent FROM the relay TO the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Reply to a successful `auth`: who is here right now
    Users {
        myid: String,
        users: Vec<String>,
        user_infos: BTreeMap<String, Identity>,
    },
    /// Broadcast: a peer authenticated
    NewUser { peer_id: String, user_info: Identity },
    Offer { from: String, offer: Payload },
    Answer { from: String, answer: Payload },
    Ice { from: String, ice: Payload },
    /// Broadcast: a peer's transport closed
    PeerClose { peer: String },
    Error { code: String, message: String },
}

impl From<&RelayError> for ServerMessage {
    fn from(err: &RelayError) -> Self {
        ServerMessage::Error {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Opaque payload of a relayed negotiation message.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Offer(Payload),
    Answer(Payload),
    Ice(Payload),
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::Ice(_) => "ice",
        }
    }

    /// The outbound message the target receives, stamped with the sender.
    pub fn from_peer(self, from: String) -> ServerMessage {
        match self {
            Signal::Offer(offer) => ServerMessage::Offer { from, offer },
            Signal::Answer(answer) => ServerMessage::Answer { from, answer },
            Signal::Ice(ice) => ServerMessage::Ice { from, ice },
        }
    }
}

/// Top-level fields of an inbound frame, values left as raw JSON text.
type RawFields<'a> = BTreeMap<String, &'a RawValue>;

/// Parse a text frame, naming the offending kind when it cannot be handled.
///
/// Only the envelope is decoded; payload fields are sliced out of `text`.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, RelayError> {
    let fields: RawFields<'_> = serde_json::from_str(text).map_err(|e| match e.classify() {
        // Well-formed JSON that is not an object has no kind to read
        Category::Data => RelayError::MissingKind,
        Category::Io | Category::Syntax | Category::Eof => RelayError::InvalidJson(e.to_string()),
    })?;

    let kind = fields
        .get("kind")
        .and_then(|raw| serde_json::from_str::<String>(raw.get()).ok())
        .ok_or(RelayError::MissingKind)?;

    match kind.as_str() {
        "auth" => Ok(ClientMessage::Auth {
            token: string_field(&fields, &kind, "token")?,
        }),
        "offer" => Ok(ClientMessage::Offer {
            to: string_field(&fields, &kind, "to")?,
            offer: required(&fields, &kind, "offer")?.into(),
        }),
        "answer" => Ok(ClientMessage::Answer {
            to: string_field(&fields, &kind, "to")?,
            answer: required(&fields, &kind, "answer")?.into(),
        }),
        "ice" => Ok(ClientMessage::Ice {
            to: string_field(&fields, &kind, "to")?,
            ice: fields
                .get("ice")
                .map_or_else(Payload::null, |raw| Payload::from(*raw)),
        }),
        _ => Err(RelayError::UnknownKind(kind)),
    }
}

fn required<'a>(
    fields: &RawFields<'a>,
    kind: &str,
    name: &str,
) -> Result<&'a RawValue, RelayError> {
    fields.get(name).copied().ok_or_else(|| RelayError::Malformed {
        kind: kind.to_string(),
        reason: format!("missing field `{name}`"),
    })
}

fn string_field(fields: &RawFields<'_>, kind: &str, name: &str) -> Result<String, RelayError> {
    let raw = required(fields, kind, name)?;
    serde_json::from_str(raw.get()).map_err(|e| RelayError::Malformed {
        kind: kind.to_string(),
        reason: format!("field `{name}`: {e}"),
    })
}
