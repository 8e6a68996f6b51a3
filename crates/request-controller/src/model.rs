/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use interrupt_support::{SqlInterruptHandle, TaskToken};
use local_store::HistoryStatus;
use remote_store::Scope;
use std::sync::Arc;

/// Response text persisted for a request the user cancelled.
pub const CANCELLED_RESPONSE: &str = "[Cancelled by user]";

/// Synthesized in place of a cancelled row's actual response when building
/// conversation history for the *next* AI call.
pub const INTERRUPTED_HISTORY_MARKER: &str = "[Message processing was interrupted by user]";

/// Appended to the in-memory recent-history ring the instant `Cancel` runs,
/// so the very next `Ask` sees a marker even if the DB write hasn't landed
/// yet.
pub const ESC_RING_MARKER: &str = "[User pressed ESC - Previous message was interrupted]";

/// Per-request state held in the active map, keyed by `request_id`.
pub(crate) struct ActiveRequest {
    pub status: HistoryStatus,
    pub command: String,
    /// Cancellable by the user; aborting this does not touch `db_cancel`.
    pub ai_cancel: TaskToken,
    /// Present so DB operations for this request *could* be interrupted
    /// independently, but `Cancel` never calls `.interrupt()` on it -
    /// audit writes always complete.
    #[allow(dead_code)]
    pub db_cancel: Arc<SqlInterruptHandle>,
    /// `(scope, id)` per Remote table this request's pending row landed in
    /// (more than one under hybrid mode); a fallback key for status-update
    /// retries when the `request_id`-keyed update touches zero rows.
    pub turso_id: Vec<(Scope, i64)>,
    pub started_at: i64,
}

/// Outcome of a completed (or cancelled) `Ask`.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub request_id: String,
    pub status: HistoryStatus,
    pub response: String,
}
