//! Session lifecycle: creation, append, rename, delete, and the
//! reconciliation of optimistic local state with the remote store.
//!
//! A session moves Draft → Persisted → Deleted. Draft covers everything
//! before the first acknowledged remote write; Deleted is removal from the
//! catalog, also reachable straight from Draft when a session is abandoned
//! before any write lands. Callers never observe the state directly, only
//! its effects on the catalog and the active transcript.
//!
//! Remote writes are fire-and-forget: a failure is handed to the write
//! policy and the optimistic local state stands. No operation retries and
//! none is fatal; a stale view heals on the next sign-in. Every operation
//! takes `&mut self`, so a caller cannot start a second mutation while one
//! is suspended at a remote call.

use chrono::Utc;

use crate::catalog::{self, SessionSummary};
use crate::gateway::{GatewayError, HistoryRecord, RemoteGateway};
use crate::loader::{self, Message};
use crate::mirror::SessionMirror;

/// Title given to a session at creation, replaced by the first message's
/// preview exactly once.
pub const PLACEHOLDER_TITLE: &str = "Untitled chat";

/// Reaction to a failed fire-and-forget remote call.
pub type WriteFailurePolicy = fn(op: &'static str, session_id: &str, error: &GatewayError);

/// Stock policy: log to the diagnostic channel and keep the optimistic
/// local state. Never retries, never surfaces.
pub fn log_and_keep(op: &'static str, session_id: &str, error: &GatewayError) {
    tracing::warn!(op, session_id, error = %error, "remote call failed; keeping local state");
}

/// Builds the session id for `email` at a given millisecond timestamp.
///
/// Two calls in the same millisecond for the same user collide; the id
/// scheme carries no entropy beyond the clock.
pub fn allocate_session_id(email: &str, timestamp_millis: i64) -> String {
    format!("{email}_{timestamp_millis}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SessionState {
    #[default]
    Draft,
    Persisted,
}

#[derive(Default)]
struct ActiveSession {
    id: Option<String>,
    title: Option<String>,
    messages: Vec<Message>,
    state: SessionState,
}

/// Owns the catalog, the per-user history cache, and the active session,
/// and is the only writer of all three.
pub struct SessionLifecycleManager {
    gateway: RemoteGateway,
    email: String,
    mirror: Option<Box<dyn SessionMirror>>,
    on_write_failure: WriteFailurePolicy,
    catalog: Vec<SessionSummary>,
    history: Vec<HistoryRecord>,
    active: ActiveSession,
}

impl SessionLifecycleManager {
    pub fn new(gateway: RemoteGateway, email: impl Into<String>) -> Self {
        Self {
            gateway,
            email: email.into(),
            mirror: None,
            on_write_failure: log_and_keep,
            catalog: Vec::new(),
            history: Vec::new(),
            active: ActiveSession::default(),
        }
    }

    /// Attaches a transcript mirror, consulted on select and kept in step
    /// with the active session on every mutation.
    pub fn with_mirror(mut self, mirror: Box<dyn SessionMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Replaces the reaction to failed remote calls. The state machine is
    /// unaffected; only the failure side effect changes.
    pub fn with_write_policy(mut self, policy: WriteFailurePolicy) -> Self {
        self.on_write_failure = policy;
        self
    }

    /// Loads both store collections, rebuilds the catalog, and lands on
    /// the newest session (or a fresh draft when there is none).
    ///
    /// A failed load is logged and treated as an empty collection; the
    /// worst outcome is an empty or stale view until the next sign-in.
    pub async fn sign_in(&mut self) {
        let (history, titles) = tokio::join!(
            self.gateway.fetch_history(&self.email),
            self.gateway.fetch_titles(&self.email),
        );
        let history = history.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load history; starting empty");
            Vec::new()
        });
        let titles = titles.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load titles; starting empty");
            Vec::new()
        });

        self.catalog = catalog::build(&history, &titles);
        self.history = history;
        tracing::debug!(sessions = self.catalog.len(), "signed in");

        if let Some(id) = self.catalog.first().map(|s| s.id.clone()) {
            self.select(&id);
        } else {
            self.start_draft();
        }
    }

    /// Creates a session. The id is allocated synchronously, before the
    /// first remote write; the placeholder title and greeting record are
    /// then written to the store, and the session is registered in the
    /// catalog and selected.
    pub async fn create(&mut self) -> String {
        let now = Utc::now();
        let id = allocate_session_id(&self.email, now.timestamp_millis());

        self.active = ActiveSession {
            id: Some(id.clone()),
            title: Some(PLACEHOLDER_TITLE.to_string()),
            messages: loader::materialize(&[]),
            state: SessionState::Draft,
        };
        self.catalog.insert(
            0,
            SessionSummary {
                id: id.clone(),
                title: Some(PLACEHOLDER_TITLE.to_string()),
                derived_title: None,
                created_at: Some(now),
            },
        );

        self.register_title(&id).await;
        let greeting = HistoryRecord {
            session_id: id.clone(),
            user_email: self.email.clone(),
            user_text: String::new(),
            assistant_text: loader::GREETING.to_string(),
            created_at: None,
        };
        match self.gateway.append_history(&greeting).await {
            Ok(()) => {
                self.mark_persisted();
                self.history.push(greeting);
            }
            Err(e) => (self.on_write_failure)("append_history", &id, &e),
        }

        self.mirror_active();
        tracing::debug!(session_id = %id, "session created");
        id
    }

    /// Makes `id` the active session. The mirror's transcript wins when
    /// one exists; otherwise the message list is derived from the loaded
    /// history. Either way an empty result falls back to the greeting.
    pub fn select(&mut self, id: &str) {
        let mut messages = match self.mirror.as_ref().and_then(|m| m.get(id)) {
            Some(cached) => cached,
            None => {
                let records: Vec<HistoryRecord> = self
                    .history
                    .iter()
                    .filter(|r| r.session_id == id)
                    .cloned()
                    .collect();
                loader::materialize(&records)
            }
        };
        if messages.is_empty() {
            messages = loader::materialize(&[]);
        }

        let title = self
            .catalog
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.title.clone());
        let state = if self.catalog.iter().any(|s| s.id == id) {
            SessionState::Persisted
        } else {
            SessionState::Draft
        };
        self.active = ActiveSession {
            id: Some(id.to_string()),
            title,
            messages,
            state,
        };
    }

    /// Appends a user message and drives the full exchange: optimistic
    /// echo, id allocation for a fresh draft, the one-shot auto title,
    /// the assistant round trip, and persistence of the exchange.
    ///
    /// Blank input is rejected before anything else happens. A failed
    /// assistant call leaves exactly the user message, locally only.
    pub async fn append_message(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        // The user sees their message before any network round trip.
        self.active.messages.push(Message::user(text));

        let id = match self.active.id.clone() {
            Some(id) => id,
            None => {
                let now = Utc::now();
                let id = allocate_session_id(&self.email, now.timestamp_millis());
                self.active.id = Some(id.clone());
                self.active.title = Some(PLACEHOLDER_TITLE.to_string());
                self.catalog.insert(
                    0,
                    SessionSummary {
                        id: id.clone(),
                        title: Some(PLACEHOLDER_TITLE.to_string()),
                        derived_title: None,
                        created_at: Some(now),
                    },
                );
                self.register_title(&id).await;
                id
            }
        };

        // Replaces the placeholder at most once per session; the local
        // title flips first, so a failed upsert cannot re-arm it.
        if self.active.title.as_deref() == Some(PLACEHOLDER_TITLE) {
            let derived = catalog::title_preview(text);
            self.set_local_title(&id, derived.clone());
            match self.gateway.upsert_title(&id, &derived, &self.email).await {
                Ok(()) => self.mark_persisted(),
                Err(e) => (self.on_write_failure)("upsert_title", &id, &e),
            }
        }

        match self.gateway.consult(&self.active.messages).await {
            Ok(Some(reply)) => {
                self.active.messages.push(Message::assistant(&reply));
                let record = HistoryRecord {
                    session_id: id.clone(),
                    user_email: self.email.clone(),
                    user_text: text.to_string(),
                    assistant_text: reply,
                    created_at: None,
                };
                match self.gateway.append_history(&record).await {
                    Ok(()) => {
                        self.mark_persisted();
                        self.history.push(record);
                    }
                    Err(e) => (self.on_write_failure)("append_history", &id, &e),
                }
            }
            Ok(None) => tracing::debug!(session_id = %id, "assistant returned no reply"),
            Err(e) => (self.on_write_failure)("consult", &id, &e),
        }

        self.mirror_active();
    }

    /// Renames a session. The local title changes only once the store
    /// acknowledges the upsert; a failed rename leaves the old title
    /// visible.
    pub async fn rename(&mut self, id: &str, new_title: &str) {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return;
        }

        match self.gateway.upsert_title(id, new_title, &self.email).await {
            Ok(()) => {
                self.set_local_title(id, new_title.to_string());
                if self.active.id.as_deref() == Some(id) {
                    self.mark_persisted();
                }
            }
            Err(e) => (self.on_write_failure)("upsert_title", id, &e),
        }
    }

    /// Deletes a session: the title and history deletions are issued
    /// concurrently, and the local catalog entry, history cache, mirror
    /// entry, and (when selected) the active transcript are removed no
    /// matter what the store answered. Deleting an id already absent from
    /// the catalog is a no-op.
    pub async fn delete(&mut self, id: &str) {
        if !self.catalog.iter().any(|s| s.id == id) {
            return;
        }

        let (title_result, history_result) = tokio::join!(
            self.gateway.delete_title(id, &self.email),
            self.gateway.delete_history(id, &self.email),
        );
        if let Err(e) = title_result {
            (self.on_write_failure)("delete_title", id, &e);
        }
        if let Err(e) = history_result {
            (self.on_write_failure)("delete_history", id, &e);
        }

        self.catalog.retain(|s| s.id != id);
        self.history.retain(|r| r.session_id != id);
        if self.active.id.as_deref() == Some(id) {
            self.active = ActiveSession::default();
        }
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.remove(id);
        }
        tracing::debug!(session_id = id, "session deleted");
    }

    /// Catalog entries, newest first.
    pub fn catalog(&self) -> &[SessionSummary] {
        &self.catalog
    }

    /// Transcript of the active session.
    pub fn messages(&self) -> &[Message] {
        &self.active.messages
    }

    /// Id of the active session, if it has one yet.
    pub fn active_id(&self) -> Option<&str> {
        self.active.id.as_deref()
    }

    /// Stored title of the active session.
    pub fn active_title(&self) -> Option<&str> {
        self.active.title.as_deref()
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    fn start_draft(&mut self) {
        self.active = ActiveSession {
            id: None,
            title: None,
            messages: loader::materialize(&[]),
            state: SessionState::Draft,
        };
    }

    async fn register_title(&mut self, id: &str) {
        match self.gateway.upsert_title(id, PLACEHOLDER_TITLE, &self.email).await {
            Ok(()) => self.mark_persisted(),
            Err(e) => (self.on_write_failure)("upsert_title", id, &e),
        }
    }

    fn mark_persisted(&mut self) {
        if self.active.state == SessionState::Draft {
            self.active.state = SessionState::Persisted;
            tracing::debug!(session_id = ?self.active.id, "session persisted");
        }
    }

    fn set_local_title(&mut self, id: &str, title: String) {
        if let Some(entry) = self.catalog.iter_mut().find(|s| s.id == id) {
            entry.title = Some(title.clone());
        }
        if self.active.id.as_deref() == Some(id) {
            self.active.title = Some(title);
        }
    }

    fn mirror_active(&mut self) {
        if let Some(id) = self.active.id.clone()
            && let Some(mirror) = self.mirror.as_mut()
        {
            mirror.set(&id, &self.active.messages);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The id is the owner's email plus the creation-time millisecond
    /// token.
    #[test]
    fn test_allocate_session_id_format() {
        assert_eq!(
            allocate_session_id("alumno@tectijuana.edu.mx", 1_700_000_000_000),
            "alumno@tectijuana.edu.mx_1700000000000"
        );
    }

    /// Two allocations in the same millisecond collide. Known fragility
    /// of the id scheme, kept as-is.
    #[test]
    fn test_allocate_session_id_same_millisecond_collides() {
        let a = allocate_session_id("alumno@tectijuana.edu.mx", 1_700_000_000_000);
        let b = allocate_session_id("alumno@tectijuana.edu.mx", 1_700_000_000_000);
        assert_eq!(a, b);
    }
}
