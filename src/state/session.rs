use crate::error::SessionError;
use crate::state::registry::SessionId;
use std::net::SocketAddr;

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket exists but nothing has been read yet
    Connecting,
    /// Waiting for the display name
    Handshaking,
    /// Registered and routing envelopes
    Active,
    /// Logout, I/O failure or forced removal seen; tearing down
    Closing,
    /// Terminal
    Closed,
}

impl SessionState {
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Handshaking)
                | (Handshaking, Active)
                | (Connecting | Handshaking | Active, Closing)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

#[derive(Debug)]
pub struct Session {
    /// When the connection was accepted
    pub connected_at: std::time::Instant,
    pub peer: Option<SocketAddr>,

    /// Issued by the registry on successful handshake
    id: Option<SessionId>,
    /// Display name, set once during the handshake
    name: Option<String>,
    state: SessionState,
}

impl Session {
    pub fn new(peer: Option<SocketAddr>) -> Self {
        Self {
            connected_at: std::time::Instant::now(),
            peer,
            id: None,
            name: None,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn advance(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_advance_to(next) {
            return Err(SessionError::InvalidTransition { from: self.state, to: next });
        }
        tracing::trace!(from = ?self.state, to = ?next, session_id = ?self.id, "session transition");
        self.state = next;
        Ok(())
    }

    /// Handshaking -> Active, recording the registry-issued identity
    pub fn activate(&mut self, id: SessionId, name: String) -> Result<(), SessionError> {
        self.advance(SessionState::Active)?;
        self.id = Some(id);
        self.name = Some(name);
        Ok(())
    }

    /// Moves to Closing unless already closing or closed.
    pub fn begin_close(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        self.state = SessionState::Closing;
    }

    /// Moves through Closing to Closed. Safe to call more than once.
    pub fn finish_close(&mut self) {
        self.begin_close();
        self.state = SessionState::Closed;
    }
}
