//! Merges the two store collections into an ordered session catalog.
//!
//! Everything here is a pure function of its inputs. Network access and
//! mutation live in the lifecycle manager.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::gateway::{HistoryRecord, TitleRecord};

/// Longest title derived from a message, in characters.
pub const TITLE_PREVIEW_CHARS: usize = 20;

/// Catalog-facing projection of a session: its label and sort key,
/// without the message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    /// Stored title, if the user (or the auto-title pass) set one.
    pub title: Option<String>,
    /// Preview of the session's first user message, for summaries with no
    /// stored title.
    pub derived_title: Option<String>,
    /// Taken from the title record; sessions without one sort last.
    pub created_at: Option<DateTime<Utc>>,
}

impl SessionSummary {
    /// Label shown in a session list: stored title, else first-message
    /// preview, else the creation token at the end of the id (the front
    /// of the id is the owner's email, useless as a label).
    pub fn display_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        if let Some(derived) = &self.derived_title {
            return derived.clone();
        }
        short_session_id(&self.id)
    }
}

/// Returns the creation token of a session id (the part after the last
/// `_`), or the whole id when it has none.
pub fn short_session_id(id: &str) -> String {
    id.rsplit('_').next().unwrap_or(id).to_string()
}

/// Truncates message text to a title-sized preview, appending an ellipsis
/// when anything was cut.
pub fn title_preview(text: &str) -> String {
    let trimmed = text.trim();
    let mut preview: String = trimmed.chars().take(TITLE_PREVIEW_CHARS).collect();
    if trimmed.chars().count() > TITLE_PREVIEW_CHARS {
        preview.push('…');
    }
    preview
}

/// Total order used by the catalog sort: newest first, with a missing
/// timestamp treated as the earliest possible instant, so undated
/// summaries land after every dated one.
pub fn newest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Builds the catalog from the two independently fetched collections.
///
/// Ids are collected as a union (a session may have history but no title,
/// or a title but no history yet), in discovery order: history first,
/// then titles. The sort is stable, so summaries the comparator ties keep
/// that discovery order.
pub fn build(history: &[HistoryRecord], titles: &[TitleRecord]) -> Vec<SessionSummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for record in history {
        if seen.insert(&record.session_id) {
            order.push(&record.session_id);
        }
    }
    for record in titles {
        if seen.insert(&record.session_id) {
            order.push(&record.session_id);
        }
    }

    let mut summaries: Vec<SessionSummary> = order
        .into_iter()
        .map(|id| {
            let title_record = titles.iter().find(|t| t.session_id == id);
            let title = title_record.and_then(|t| normalize_title(&t.title));
            let created_at = title_record
                .and_then(|t| t.created_at.as_deref())
                .and_then(|raw| {
                    let parsed = parse_created_at(raw);
                    if parsed.is_none() {
                        tracing::warn!(
                            session_id = id,
                            created_at = raw,
                            "unparseable title timestamp; sorting last"
                        );
                    }
                    parsed
                });
            let derived_title = history
                .iter()
                .find(|r| r.session_id == id && !r.user_text.trim().is_empty())
                .map(|r| title_preview(&r.user_text));
            SessionSummary {
                id: id.to_string(),
                title,
                derived_title,
                created_at,
            }
        })
        .collect();

    summaries.sort_by(|a, b| newest_first(a.created_at, b.created_at));
    summaries
}

/// Case-insensitive substring filter over the stored title, falling back
/// to the raw id for untitled sessions. An empty term matches everything.
pub fn filter(summaries: &[SessionSummary], search_term: &str) -> Vec<SessionSummary> {
    let term = search_term.to_lowercase();
    summaries
        .iter()
        .filter(|summary| {
            summary
                .title
                .as_deref()
                .unwrap_or(&summary.id)
                .to_lowercase()
                .contains(&term)
        })
        .cloned()
        .collect()
}

fn normalize_title(title: &str) -> Option<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Store rows have been observed without an offset suffix.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
