use crate::filter::BannedWords;
use crate::net::output::OutFrame;
use crate::protocol::{Envelope, EnvelopeKind, MSG_COMMAND};
use crate::state::registry::{Registry, SessionId};
use std::sync::Arc;

/// Source of the `HH:MM:SS` stamp on rendered lines
pub trait Clock: Send + Sync {
    fn timestamp(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn timestamp(&self) -> String {
        chrono::Local::now().format("%H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn timestamp(&self) -> String {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading envelopes
    Continue,
    /// The session logged out
    Stop,
}

/// Everything routing needs for one session
pub struct RouteCtx {
    /// Shared session set
    pub registry: Arc<Registry>,
    /// Banned words applied to outbound chat
    pub filter: Arc<BannedWords>,
    pub clock: Arc<dyn Clock>,
    /// The session the envelope arrived on
    pub id: SessionId,
    pub name: String,
}

/// Dispatches one envelope. All side effects go through the registry.
pub fn route(envelope: Envelope, ctx: &RouteCtx) -> Flow {
    if !envelope.sender.is_empty() && !envelope.sender.eq_ignore_ascii_case(&ctx.name) {
        tracing::warn!(session_id = %ctx.id, claimed = %envelope.sender, name = %ctx.name, "ignoring sender field");
    }

    match envelope.kind {
        EnvelopeKind::Logout => logout(ctx, &envelope.body),
        EnvelopeKind::Directed { recipient } => {
            direct(ctx, &recipient, &envelope.body);
            Flow::Continue
        }
        EnvelopeKind::ListQuery => {
            list(ctx);
            Flow::Continue
        }
        EnvelopeKind::Broadcast => {
            broadcast(ctx, &envelope.body);
            Flow::Continue
        }
    }
}

fn logout(ctx: &RouteCtx, farewell: &str) -> Flow {
    ctx.registry.unregister(ctx.id);
    tracing::info!(session_id = %ctx.id, name = %ctx.name, "{}", farewell);
    Flow::Stop
}

fn direct(ctx: &RouteCtx, recipient: &str, body: &str) {
    let payload = strip_command_prefix(body, recipient);
    let line = render_direct(&ctx.clock.timestamp(), &ctx.name, recipient, payload);
    let line = ctx.filter.censor(&line);
    tracing::debug!(session_id = %ctx.id, "{}", line.trim_end());

    let outcome = ctx.registry.direct_message(&line, &ctx.name, recipient);
    if !outcome.recipient_found {
        ctx.registry
            .send_to(ctx.id, OutFrame::Notice(format!("User '{recipient}' is not connected.")));
    }
}

fn list(ctx: &RouteCtx) {
    tracing::debug!(session_id = %ctx.id, name = %ctx.name, "list query");
    if let Some(text) = ctx.registry.list_active_users(ctx.id) {
        ctx.registry.send_to(ctx.id, OutFrame::Line(text));
    }
}

fn broadcast(ctx: &RouteCtx, body: &str) {
    let line = ctx.filter.censor(&render_broadcast(&ctx.clock.timestamp(), &ctx.name, body));
    tracing::debug!(session_id = %ctx.id, "{}", line.trim_end());
    ctx.registry.broadcast(&line);
}

pub fn render_broadcast(time: &str, sender: &str, body: &str) -> String {
    format!("{time} {sender}: {body}\n")
}

pub fn render_direct(time: &str, sender: &str, recipient: &str, payload: &str) -> String {
    format!("{time} {sender} -> {recipient}: {payload}\n")
}

/// Drops the leading "/msg {recipient}" so "/msg bob hi" becomes "hi".
/// Bodies without the command word fall back to stripping through the first
/// case-insensitive occurrence of `recipient`.
pub fn strip_command_prefix<'a>(body: &'a str, recipient: &str) -> &'a str {
    let trimmed = body.trim_start();
    let (head, rest) = split_word(trimmed);
    if head.eq_ignore_ascii_case(MSG_COMMAND) {
        let (target, after) = split_word(rest);
        if target.to_lowercase() == recipient.to_lowercase() {
            return after.trim_end();
        }
        return rest.trim_end();
    }

    match find_ignore_case(body, recipient) {
        Some(end) => body[end..].trim(),
        None => body.trim(),
    }
}

/// Splits off the first whitespace-delimited word; the remainder is left-trimmed.
fn split_word(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Byte offset just past the first case-insensitive match of `needle`.
fn find_ignore_case(hay: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }

    hay.char_indices().find_map(|(start, _)| {
        let mut rest = hay[start..].char_indices();
        for n in needle.chars() {
            let (_, h) = rest.next()?;
            if h != n && !h.to_lowercase().eq(n.to_lowercase()) {
                return None;
            }
        }
        Some(rest.next().map_or(hay.len(), |(i, _)| start + i))
    })
}
