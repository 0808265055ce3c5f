use crate::state::session::SessionState;
use thiserror::Error;

pub type AppResult<T> = Result<T, SessionError>;

/// Errors that end a single session. Never propagated to other sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// I/O failure or EOF on the connection
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] std::io::Error),

    #[error("invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("invalid display name: {0}")]
    InvalidName(String),

    #[error("display name already taken: {0}")]
    DuplicateName(String),

    #[error("client disconnected before sending a name")]
    Disconnected,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u64),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("display name already taken: {0}")]
    DuplicateName(String),
}

#[derive(Debug, Error)]
pub enum ConfigErrorKind {
    #[error("failed to read file: {0}")]
    Read(std::io::Error),

    #[error("failed to parse file: {0}")]
    Parse(toml::de::Error),

    #[error("invalid environment variable {0}: {1}")]
    InvalidEnv(String, String),
}

/// Fatal errors raised before the listener is bound.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: std::path::PathBuf,
        #[source]
        source: ConfigErrorKind,
    },

    #[error("invalid environment: {0}")]
    Env(ConfigErrorKind),

    #[error("cannot load banned words from {path}: {source}")]
    BannedWords {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
