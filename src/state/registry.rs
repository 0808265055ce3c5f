use crate::error::RegistryError;
use crate::net::output::{DeliveryFailure, OutFrame, OutputHandle};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

pub const ALONE_NOTICE: &str = "You are the only user in the chat server!";
pub const LIST_HEADER: &str = "Active Users: \n";

/// Opaque session identifier, never reused while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handed back to a session on successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: SessionId,
    /// Fired when the session is removed from the registry by anyone
    pub closed: Arc<Notify>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectOutcome {
    /// Number of sessions the line was queued for
    pub delivered: usize,
    /// Whether the recipient is currently registered
    pub recipient_found: bool,
}

#[derive(Debug)]
struct Entry {
    name: String,
    output: OutputHandle,
    closed: Arc<Notify>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Ordered by id, which is registration order
    sessions: BTreeMap<SessionId, Entry>,
    /// Lowercased display name -> id
    names: HashMap<String, SessionId>,
}

/// The single authoritative set of active sessions.
///
/// Every operation takes the same lock, so a session removed by one task is
/// never observed half-removed by a broadcast running on another. Delivery
/// happens after the lock is released, on a snapshot of the targets.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

fn name_key(name: &str) -> String {
    name.to_lowercase()
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session unless another active session holds the same name
    /// (compared case-insensitively).
    pub fn register(&self, name: &str, output: OutputHandle) -> Result<Registration, RegistryError> {
        let key = name_key(name);
        let mut g = self.inner.lock();

        if g.names.contains_key(&key) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let closed = Arc::new(Notify::new());
        g.names.insert(key, id);
        g.sessions.insert(
            id,
            Entry {
                name: name.to_string(),
                output,
                closed: closed.clone(),
            },
        );
        drop(g);

        tracing::debug!(session_id = %id, %name, "session registered");
        Ok(Registration { id, closed })
    }

    /// Removes a session and wakes its read loop. Returns false if the id was
    /// not registered.
    pub fn unregister(&self, id: SessionId) -> bool {
        let entry = {
            let mut g = self.inner.lock();
            let Some(entry) = g.sessions.remove(&id) else {
                return false;
            };
            let key = name_key(&entry.name);
            if g.names.get(&key) == Some(&id) {
                g.names.remove(&key);
            }
            entry
        };

        tracing::debug!(session_id = %id, name = %entry.name, "session unregistered");
        Self::release(entry);
        true
    }

    /// Unregisters every session. Returns how many were removed.
    pub fn shutdown(&self) -> usize {
        let sessions = {
            let mut g = self.inner.lock();
            g.names.clear();
            std::mem::take(&mut g.sessions)
        };

        let count = sessions.len();
        for (_, entry) in sessions {
            Self::release(entry);
        }
        tracing::info!(count, "registry shut down");
        count
    }

    // Dropping the entry drops the registry's output handle; the read loop
    // drops the other one once woken, which closes the writer.
    fn release(entry: Entry) {
        entry.closed.notify_one();
    }

    /// Queues `text` for every active session. Sessions whose writer is gone
    /// are removed; a full queue only loses this line.
    pub fn broadcast(&self, text: &str) -> usize {
        let targets: Vec<(SessionId, OutputHandle)> = {
            let g = self.inner.lock();
            g.sessions.iter().map(|(id, e)| (*id, e.output.clone())).collect()
        };

        self.deliver_all(targets, text)
    }

    /// Queues `text` for the sender and the recipient (matched
    /// case-insensitively). A missing recipient is not an error.
    pub fn direct_message(&self, text: &str, sender: &str, recipient: &str) -> DirectOutcome {
        let (targets, recipient_found) = {
            let g = self.inner.lock();
            let sender_id = g.names.get(&name_key(sender)).copied();
            let recipient_id = g.names.get(&name_key(recipient)).copied();

            let mut ids: Vec<SessionId> = sender_id.into_iter().chain(recipient_id).collect();
            ids.dedup();

            let targets: Vec<(SessionId, OutputHandle)> = ids
                .into_iter()
                .filter_map(|id| g.sessions.get(&id).map(|e| (id, e.output.clone())))
                .collect();
            (targets, recipient_id.is_some())
        };

        DirectOutcome {
            delivered: self.deliver_all(targets, text),
            recipient_found,
        }
    }

    /// Names of every other active session, or the "alone" notice when the
    /// requester is the only one. `None` if the requester is not registered.
    pub fn list_active_users(&self, requester: SessionId) -> Option<String> {
        let g = self.inner.lock();
        if !g.sessions.contains_key(&requester) {
            return None;
        }
        if g.sessions.len() == 1 {
            return Some(ALONE_NOTICE.to_string());
        }

        let mut out = String::from(LIST_HEADER);
        for (_, entry) in g.sessions.iter().filter(|(id, _)| **id != requester) {
            out.push_str(&entry.name);
            out.push('\n');
        }
        Some(out)
    }

    /// Queues a frame for one session.
    pub fn send_to(&self, id: SessionId, frame: OutFrame) -> bool {
        let Some(output) = self.inner.lock().sessions.get(&id).map(|e| e.output.clone()) else {
            return false;
        };

        match output.try_deliver(frame) {
            Ok(()) => true,
            Err(failure) => {
                self.handle_failure(id, failure);
                false
            }
        }
    }

    fn deliver_all(&self, targets: Vec<(SessionId, OutputHandle)>, text: &str) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, output) in targets {
            match output.try_deliver(OutFrame::Line(text.to_string())) {
                Ok(()) => delivered += 1,
                Err(failure) => failed.push((id, failure)),
            }
        }

        for (id, failure) in failed {
            self.handle_failure(id, failure);
        }
        delivered
    }

    fn handle_failure(&self, id: SessionId, failure: DeliveryFailure) {
        match failure {
            DeliveryFailure::Full => {
                tracing::warn!(session_id = %id, "outbound queue full, dropping line");
            }
            DeliveryFailure::Closed => {
                tracing::info!(session_id = %id, "delivery failed, removing session");
                self.unregister(id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }

    /// Display names in registration order
    pub fn names(&self) -> Vec<String> {
        self.inner.lock().sessions.values().map(|e| e.name.clone()).collect()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.inner.lock().names.contains_key(&name_key(name))
    }
}
