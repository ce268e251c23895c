use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GmailError;

/// Bulk categories that never receive an automated reply
pub const BULK_CATEGORIES: &[&str] = &[
    "CATEGORY_FORUMS",
    "CATEGORY_UPDATES",
    "CATEGORY_PROMOTIONS",
    "CATEGORY_SOCIAL",
];

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// A message id and its thread, as returned by messages.list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

/// Full header view of a single message
///
/// Headers are kept optional here: whether a message is answerable is
/// decided by the responder, which reports absent headers per message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboxMessage {
    pub id: String,
    pub thread_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub message_id_header: Option<String>,
}

/// What happened to a single scanned message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Reply sent and marker label applied to the thread
    Replied { reply_id: String },
    /// Thread already carries the marker label; nothing sent
    AlreadyMarked,
    /// Dry run: a reply was composed but not sent
    WouldReply,
}

/// Per-message result of a scan
#[derive(Debug)]
pub struct MessageOutcome {
    pub message_id: String,
    pub thread_id: String,
    pub result: std::result::Result<ReplyStatus, GmailError>,
}

impl MessageOutcome {
    pub fn is_replied(&self) -> bool {
        matches!(self.result, Ok(ReplyStatus::Replied { .. }))
    }

    pub fn is_failed(&self) -> bool {
        self.result.is_err()
    }
}

/// Summary of one scan cycle
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub marker_label_id: String,
    pub outcomes: Vec<MessageOutcome>,
}

impl CycleReport {
    pub fn scanned(&self) -> usize {
        self.outcomes.len()
    }

    pub fn replied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_replied()).count()
    }

    pub fn already_marked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Ok(ReplyStatus::AlreadyMarked)))
            .count()
    }

    pub fn would_reply(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Ok(ReplyStatus::WouldReply)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}
