/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/// How to reach the Remote store, built from `REMOTE_DB_URL` /
/// `REMOTE_DB_TOKEN` / `REMOTE_DB_SYNC_URL` (spec §6).
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// A local file path (embedded replica) or `libsql://`/`https://` URL
    /// (pure remote client), from `REMOTE_DB_URL`.
    pub url: String,
    pub token: Option<String>,
    /// When set, `url` is treated as a local embedded-replica path that
    /// syncs against this Turso cloud URL.
    pub sync_url: Option<String>,
}

impl RemoteConfig {
    pub fn is_remote_url(&self) -> bool {
        self.url.starts_with("libsql://") || self.url.starts_with("https://") || self.url.starts_with("http://")
    }
}
