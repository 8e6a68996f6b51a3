/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Embedded SQL store: history, sync queue, metadata, conflict log. WAL
//! journaling with `synchronous=NORMAL`, adapted from the teacher's
//! `logins::db::LoginDb`/`schema` modules.

mod db;
mod error;
mod model;
mod schema;

pub use db::LocalStore;
pub use error::{LocalStoreError, Result};
pub use model::{
    truncate_with_marker, ConflictLogEntry, HistoryEntry, HistoryFilter, HistoryStatus,
    NewCommandMeta, SyncQueueItem, SyncStatus, MAX_COMMAND_BYTES, MAX_ERROR_CHARS,
    MAX_RESPONSE_BYTES,
};
