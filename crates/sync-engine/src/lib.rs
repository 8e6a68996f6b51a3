/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Bidirectional reconciliation between [`local_store::LocalStore`] and
//! [`remote_store::RemoteStore`]: uploads queued local writes, downloads
//! and conflict-resolves Remote history, and prunes stale synced rows.

mod conflict;
mod engine;
mod error;

pub use conflict::{entries_conflict, ConflictStrategy, Resolution};
pub use engine::{SyncEngine, SyncReport};
pub use error::{Result, SyncEngineError};
