//! Client-to-server wire formats.
//!
//! Every inbound line is one of:
//!  - a versioned JSON envelope: `{"v":1,"kind":"broadcast","sender":"amy","body":"hi"}`
//!  - a legacy JSON envelope without `v`, whose kind is inferred from its fields
//!  - a typed line as a person would enter it in a terminal (`/msg bob hi`)
//!
//! The first line of a connection is the handshake and carries the display name.

use crate::error::{DecodeError, HandshakeError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

pub const LOGOUT_COMMAND: &str = "/logout";
pub const MSG_COMMAND: &str = "/msg";
pub const LIST_COMMAND: &str = "/list";

pub const MAX_NAME_LEN: usize = 32;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s\p{Cc}]+$").expect("valid name regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    Logout,
    Directed { recipient: String },
    ListQuery,
    Broadcast,
}

/// One decoded client-to-server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub sender: String,
    pub body: String,
}

impl Envelope {
    pub fn broadcast(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self { kind: EnvelopeKind::Broadcast, sender: sender.into(), body: body.into() }
    }

    pub fn directed(sender: impl Into<String>, recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Directed { recipient: recipient.into() },
            sender: sender.into(),
            body: body.into(),
        }
    }

    pub fn list_query(sender: impl Into<String>) -> Self {
        let sender = sender.into();
        let body = format!("{LIST_COMMAND} {sender}");
        Self { kind: EnvelopeKind::ListQuery, sender, body }
    }

    pub fn logout(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self { kind: EnvelopeKind::Logout, sender: sender.into(), body: body.into() }
    }

    pub fn recipient(&self) -> Option<&str> {
        match &self.kind {
            EnvelopeKind::Directed { recipient } => Some(recipient),
            _ => None,
        }
    }

    /// Versioned JSON encoding, as a client would send it
    pub fn to_json_line(&self) -> String {
        let wire = match &self.kind {
            EnvelopeKind::Logout => WireEnvelope::Logout { sender: self.sender.clone(), body: self.body.clone() },
            EnvelopeKind::Directed { recipient } => WireEnvelope::Directed {
                sender: self.sender.clone(),
                recipient: recipient.clone(),
                body: self.body.clone(),
            },
            EnvelopeKind::ListQuery => WireEnvelope::ListQuery { sender: self.sender.clone() },
            EnvelopeKind::Broadcast => WireEnvelope::Broadcast { sender: self.sender.clone(), body: self.body.clone() },
        };
        // Serializing plain strings into JSON cannot fail
        let mut value = serde_json::to_value(&wire).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert("v".to_string(), PROTOCOL_VERSION.into());
        }
        value.to_string()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireEnvelope {
    Logout {
        #[serde(default)]
        sender: String,
        #[serde(default)]
        body: String,
    },
    Directed {
        #[serde(default)]
        sender: String,
        recipient: String,
        #[serde(default)]
        body: String,
    },
    ListQuery {
        #[serde(default)]
        sender: String,
    },
    Broadcast {
        #[serde(default)]
        sender: String,
        #[serde(default)]
        body: String,
    },
}

impl WireEnvelope {
    fn into_envelope(self, session_name: &str) -> Envelope {
        let or_session = |s: String| if s.is_empty() { session_name.to_string() } else { s };
        match self {
            WireEnvelope::Logout { sender, body } => Envelope::logout(or_session(sender), body),
            WireEnvelope::Directed { sender, recipient, body } => Envelope::directed(or_session(sender), recipient, body),
            WireEnvelope::ListQuery { sender } => Envelope::list_query(or_session(sender)),
            WireEnvelope::Broadcast { sender, body } => Envelope::broadcast(or_session(sender), body),
        }
    }
}

/// Untagged message shape used by older clients. The kind has to be inferred.
#[derive(Debug, Deserialize)]
struct LegacyEnvelope {
    #[serde(rename = "type", default)]
    kind: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    sender: Option<String>,
}

impl LegacyEnvelope {
    const LOGOUT: i64 = 1;

    fn classify(self, session_name: &str) -> Envelope {
        let sender = self.sender.filter(|s| !s.is_empty()).unwrap_or_else(|| session_name.to_string());

        if self.kind == Self::LOGOUT {
            return Envelope::logout(sender, self.message);
        }
        match self.recipient {
            Some(recipient) if !recipient.is_empty() => Envelope::directed(sender, recipient, self.message),
            _ if self.message.contains(LIST_COMMAND) => Envelope {
                kind: EnvelopeKind::ListQuery,
                sender,
                body: self.message,
            },
            _ => Envelope::broadcast(sender, self.message),
        }
    }
}

/// Decodes one inbound line from an active session.
pub fn decode_line(line: &str, session_name: &str) -> Result<Envelope, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line.trim_start().starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(line)?;
        return match value.get("v") {
            Some(v) => {
                let version = v.as_u64().unwrap_or(0);
                if u32::try_from(version).ok() != Some(PROTOCOL_VERSION) {
                    return Err(DecodeError::UnsupportedVersion(version));
                }
                let wire: WireEnvelope = serde_json::from_value(value)?;
                Ok(wire.into_envelope(session_name))
            }
            None => {
                let legacy: LegacyEnvelope = serde_json::from_value(value)?;
                Ok(legacy.classify(session_name))
            }
        };
    }

    parse_typed_line(line, session_name)
}

/// Interprets a line typed by a person.
pub fn parse_typed_line(line: &str, session_name: &str) -> Result<Envelope, DecodeError> {
    let trimmed = line.trim();
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim_start()),
        None => (trimmed, ""),
    };

    if head.eq_ignore_ascii_case(LOGOUT_COMMAND) {
        return Ok(Envelope::logout(session_name, format!("{session_name} has logged out.")));
    }

    if head.eq_ignore_ascii_case(MSG_COMMAND) {
        let (recipient, text) = match rest.split_once(char::is_whitespace) {
            Some((r, t)) => (r, t.trim()),
            None => (rest, ""),
        };
        if recipient.is_empty() || text.is_empty() {
            return Err(DecodeError::Usage("/msg <user> <message>"));
        }
        return Ok(Envelope::directed(session_name, recipient, trimmed));
    }

    if head.eq_ignore_ascii_case(LIST_COMMAND) {
        return Ok(Envelope {
            kind: EnvelopeKind::ListQuery,
            sender: session_name.to_string(),
            body: trimmed.to_string(),
        });
    }

    Ok(Envelope::broadcast(session_name, line))
}

#[derive(Debug, Deserialize)]
struct Handshake {
    #[serde(default)]
    v: Option<u32>,
    name: String,
}

/// Extracts and validates the display name from the first line of a connection.
pub fn decode_handshake(line: &str) -> Result<String, HandshakeError> {
    let line = line.trim();

    let name = if line.starts_with('{') {
        let hs: Handshake =
            serde_json::from_str(line).map_err(|e| HandshakeError::InvalidName(format!("malformed handshake: {e}")))?;
        match hs.v {
            Some(v) if v != PROTOCOL_VERSION => {
                return Err(HandshakeError::InvalidName(format!("unsupported protocol version {v}")));
            }
            _ => {}
        }
        hs.name
    } else if line.starts_with('"') {
        serde_json::from_str::<String>(line)
            .map_err(|e| HandshakeError::InvalidName(format!("malformed handshake: {e}")))?
    } else {
        line.to_string()
    };

    validate_name(&name)?;
    Ok(name)
}

pub fn validate_name(name: &str) -> Result<(), HandshakeError> {
    if name.is_empty() {
        return Err(HandshakeError::InvalidName("name is empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(HandshakeError::InvalidName(format!("name is longer than {MAX_NAME_LEN} characters")));
    }
    if !NAME_RE.is_match(name) {
        return Err(HandshakeError::InvalidName(format!("{name:?} contains whitespace or control characters")));
    }
    Ok(())
}
