//! Device-scoped durable cache of session transcripts.
//!
//! The engine only ever needs three operations, all keyed by session id.
//! Whatever a mirror holds for a session shadows the store-derived
//! transcript on select, so implementations must return exactly what was
//! written. Mirror I/O failures are never fatal; the store remains the
//! source of truth on the next full load.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::loader::Message;

/// Narrow contract for a transcript cache: lookup, replace, drop.
/// Entries survive reloads and never expire.
pub trait SessionMirror {
    fn get(&self, session_id: &str) -> Option<Vec<Message>>;
    fn set(&mut self, session_id: &str, messages: &[Message]);
    fn remove(&mut self, session_id: &str);
}

/// Volatile mirror for tests and embedders that want shadowing without
/// persistence.
#[derive(Debug, Default)]
pub struct InMemoryMirror {
    entries: HashMap<String, Vec<Message>>,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionMirror for InMemoryMirror {
    fn get(&self, session_id: &str) -> Option<Vec<Message>> {
        self.entries.get(session_id).cloned()
    }

    fn set(&mut self, session_id: &str, messages: &[Message]) {
        self.entries
            .insert(session_id.to_string(), messages.to_vec());
    }

    fn remove(&mut self, session_id: &str) {
        self.entries.remove(session_id);
    }
}

/// Durable mirror: one JSON file per session id under `dir`.
pub struct FileMirror {
    dir: PathBuf,
}

impl FileMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Session ids embed an email address; flatten anything that would
    /// escape the mirror directory.
    fn entry_path(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn write_entry(&self, path: &Path, messages: &[Message]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create mirror directory {}", self.dir.display()))?;
        let json = serde_json::to_string_pretty(messages).context("Failed to encode transcript")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write mirror entry {}", path.display()))?;
        Ok(())
    }
}

impl SessionMirror for FileMirror {
    fn get(&self, session_id: &str) -> Option<Vec<Message>> {
        let raw = fs::read_to_string(self.entry_path(session_id)).ok()?;
        match serde_json::from_str(&raw) {
            Ok(messages) => Some(messages),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "corrupt mirror entry ignored");
                None
            }
        }
    }

    fn set(&mut self, session_id: &str, messages: &[Message]) {
        let path = self.entry_path(session_id);
        if let Err(e) = self.write_entry(&path, messages) {
            tracing::warn!(session_id, error = %e, "failed to write mirror entry");
        }
    }

    fn remove(&mut self, session_id: &str) {
        let path = self.entry_path(session_id);
        if let Err(e) = fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(session_id, error = %e, "failed to remove mirror entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::loader::Sender;

    fn transcript() -> Vec<Message> {
        vec![Message::user("hola"), Message::assistant("buenas")]
    }

    /// Round trip through the in-memory mirror.
    #[test]
    fn test_in_memory_mirror_set_get_remove() {
        let mut mirror = InMemoryMirror::new();
        assert!(mirror.get("s1").is_none());

        mirror.set("s1", &transcript());
        let cached = mirror.get("s1").unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].sender, Sender::User);

        mirror.remove("s1");
        assert!(mirror.get("s1").is_none());
    }

    /// Entries written by one FileMirror instance are visible to a fresh
    /// one over the same directory.
    #[test]
    fn test_file_mirror_survives_reload() {
        let dir = tempdir().unwrap();
        let mut mirror = FileMirror::new(dir.path());
        mirror.set("a@x.mx_1700000000000", &transcript());

        let reloaded = FileMirror::new(dir.path());
        let cached = reloaded.get("a@x.mx_1700000000000").unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[1].text, "buenas");
    }

    /// The entry file is a JSON array of sender/text/timestamp strings,
    /// readable by any JSON parser without mirror code.
    #[test]
    fn test_file_mirror_entry_is_plain_json_strings() {
        let dir = tempdir().unwrap();
        let mut mirror = FileMirror::new(dir.path());
        mirror.set("s1", &transcript());

        let raw = std::fs::read_to_string(mirror.entry_path("s1")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["sender"], "user");
        assert_eq!(entries[0]["text"], "hola");
        assert!(entries[0]["timestamp"].is_string());
        assert_eq!(entries[1]["sender"], "assistant");
        assert_eq!(entries[1]["text"], "buenas");
    }

    /// The email portion of a session id cannot introduce path
    /// separators into the entry file name.
    #[test]
    fn test_file_mirror_sanitizes_session_id() {
        let dir = tempdir().unwrap();
        let mirror = FileMirror::new(dir.path());
        let path = mirror.entry_path("alumno@tectijuana.edu.mx_1700/evil");
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("alumno-tectijuana.edu.mx_1700-evil.json")
        );
        assert_eq!(path.parent(), Some(dir.path()));
    }

    /// Removing an entry that was never written is not an error.
    #[test]
    fn test_file_mirror_remove_missing_is_noop() {
        let dir = tempdir().unwrap();
        let mut mirror = FileMirror::new(dir.path());
        mirror.remove("nunca-escrito");
    }

    /// A corrupt entry is ignored rather than surfaced.
    #[test]
    fn test_file_mirror_ignores_corrupt_entry() {
        let dir = tempdir().unwrap();
        let mut mirror = FileMirror::new(dir.path());
        mirror.set("s1", &transcript());

        let path = mirror.entry_path("s1");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(mirror.get("s1").is_none());
    }
}
