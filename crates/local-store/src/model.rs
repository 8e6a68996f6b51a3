/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// `pending → processing → {completed | cancelled | error}`, with
/// `cancelled` also reachable directly from `pending`. Modeled as an enum
/// with `FromSql`/`ToSql` rather than a raw string column so the
/// "backward transitions are forbidden" invariant has a type to hang off
/// of (see `HistoryStatus::can_transition_to`), the way the teacher encodes
/// `SyncStatus` as a small int enum rather than a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Error,
}

impl HistoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }

    /// Enforces the DAG in spec §3: no backward transitions, and
    /// `cancelled` is the only terminal state reachable directly from
    /// `pending`.
    pub fn can_transition_to(self, next: HistoryStatus) -> bool {
        use HistoryStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Cancelled) | (Processing, Completed)
                | (Processing, Cancelled) | (Processing, Error)
        )
    }
}

impl std::str::FromStr for HistoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown history status: {other}")),
        }
    }
}

impl FromSql for HistoryStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

impl ToSql for HistoryStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// `pending | synced | failed`. Local-only companion to `HistoryStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

impl FromSql for SyncStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

impl ToSql for SyncStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// The central entity, logically identical in `local-store` and
/// `remote-store`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub request_id: Option<String>,
    pub command: String,
    pub response: Option<String>,
    pub status: HistoryStatus,
    pub user_id: Option<i64>,
    pub machine_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: i64,
    pub updated_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub tokens_used: Option<i64>,
    pub execution_time_ms: Option<i64>,
    pub sync_status: SyncStatus,
    pub last_synced: Option<i64>,
}

/// Input to `LocalStore::save_command`.
#[derive(Debug, Clone, Default)]
pub struct NewCommandMeta {
    pub request_id: Option<String>,
    pub user_id: Option<i64>,
    pub machine_id: Option<String>,
    pub session_id: Option<String>,
    /// Set when the caller already wrote this command to Remote (e.g.
    /// `RequestController::persist_pending`'s fanout succeeded first):
    /// skips enqueuing a `sync_queue` row so the same command isn't
    /// uploaded a second time by `SyncEngine::upload_phase`.
    pub already_synced: bool,
}

/// `{id, op, table, record_id, payload, priority, retry_count, last_error, created_at}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: i64,
    pub op: String,
    pub table: String,
    pub record_id: String,
    pub payload: String,
    pub priority: i64,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
}

/// `{command_uuid, local_data, remote_data, resolution, resolved_at}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictLogEntry {
    pub command_uuid: String,
    pub local_data: String,
    pub remote_data: String,
    pub resolution: String,
    pub resolved_at: i64,
}

/// Filter applied by `LocalStore::get_history`.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub user_id: Option<i64>,
    pub machine_id: Option<String>,
}

pub const MAX_COMMAND_BYTES: usize = 10 * 1024;
pub const MAX_RESPONSE_BYTES: usize = 100 * 1024;
pub const MAX_ERROR_CHARS: usize = 500;

/// Truncates `text` to at most `max_bytes` (on a char boundary) and appends
/// an explicit marker, per spec §4.2's "explicit `…[truncated]` marker".
pub fn truncate_with_marker(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…[truncated]", &text[..end])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_forbids_backward_transitions() {
        assert!(HistoryStatus::Pending.can_transition_to(HistoryStatus::Processing));
        assert!(HistoryStatus::Processing.can_transition_to(HistoryStatus::Completed));
        assert!(!HistoryStatus::Completed.can_transition_to(HistoryStatus::Pending));
        assert!(!HistoryStatus::Cancelled.can_transition_to(HistoryStatus::Completed));
    }

    #[test]
    fn cancelled_is_reachable_directly_from_pending() {
        assert!(HistoryStatus::Pending.can_transition_to(HistoryStatus::Cancelled));
    }

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate_with_marker("hello", 100), "hello");
    }

    #[test]
    fn truncate_marks_oversized_text() {
        let text = "a".repeat(20);
        let truncated = truncate_with_marker(&text, 10);
        assert_eq!(truncated, format!("{}…[truncated]", "a".repeat(10)));
    }
}
