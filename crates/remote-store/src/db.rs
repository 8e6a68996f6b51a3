/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::config::RemoteConfig;
use crate::error::{RemoteStoreError, Result};
use crate::model::{NewRemoteCommand, StatusUpdateExtras, UserStats};
use crate::scope::{Scope, HYBRID_WINDOW_DAYS, REQUIRED_TABLES};
use identity::{IdentityError, User, UserStore};
use local_store::{truncate_with_marker, HistoryEntry, HistoryStatus, SyncStatus};
use std::sync::Arc;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Explicit column list for the three history tables (matches positional
/// access in [`row_to_history_entry`]). `remote-store` never creates these
/// tables itself, so a bare `SELECT *` can't be trusted to return columns
/// in this order.
const HISTORY_COLUMNS: &str = "id, request_id, command, response, status, user_id, machine_id, \
     session_id, timestamp, updated_at, completed_at, tokens_used, execution_time_ms";

/// Network-backed SQL store with the same logical schema as `local-store`,
/// grounded on the teacher pack's libSQL/Turso backend pattern: a single
/// long-lived `Database` handle, one connection per operation, a
/// `busy_timeout` pragma, and explicit positional parameters throughout.
pub struct RemoteStore {
    db: Arc<libsql::Database>,
}

impl RemoteStore {
    pub async fn connect_with_config(config: &RemoteConfig) -> Result<Self> {
        let db = if let Some(sync_url) = &config.sync_url {
            libsql::Builder::new_remote_replica(
                config.url.clone(),
                sync_url.clone(),
                config.token.clone().unwrap_or_default(),
            )
            .build()
            .await?
        } else if config.is_remote_url() {
            libsql::Builder::new_remote(config.url.clone(), config.token.clone().unwrap_or_default())
                .build()
                .await?
        } else {
            libsql::Builder::new_local(&config.url).build().await?
        };
        let store = Self { db: Arc::new(db) };
        store.probe().await?;
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn connect_in_memory() -> Result<Self> {
        let db = libsql::Builder::new_local(":memory:").build().await?;
        let store = Self { db: Arc::new(db) };
        store.probe().await?;
        Ok(store)
    }

    /// One connection per operation, each with `busy_timeout` set so
    /// concurrent writers wait rather than fail instantly.
    async fn connect(&self) -> Result<libsql::Connection> {
        let conn = self.db.connect()?;
        conn.execute("PRAGMA busy_timeout = 5000", ()).await?;
        Ok(conn)
    }

    /// `SELECT 1` probe at startup with a 5-second timeout (spec §4.3).
    async fn probe(&self) -> Result<()> {
        let conn = self.connect().await?;
        tokio::time::timeout(PROBE_TIMEOUT, conn.query("SELECT 1", ()))
            .await
            .map_err(|_| RemoteStoreError::Network("probe timed out after 5s".to_string()))??;
        Ok(())
    }

    /// Refuses to proceed if any required table is absent.
    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.connect().await?;
        let mut missing = Vec::new();
        for table in REQUIRED_TABLES {
            let mut rows = conn
                .query(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    libsql::params![*table],
                )
                .await?;
            if rows.next().await?.is_none() {
                missing.push(table.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(RemoteStoreError::SchemaMissing(missing));
        }
        Ok(())
    }

    /// Writes to `history_global`/`history_user`/`history_machine`,
    /// `RETURNING id`.
    pub async fn save(
        &self,
        scope: Scope,
        command: &str,
        response: Option<&str>,
        meta: NewRemoteCommand,
    ) -> Result<i64> {
        let conn = self.connect().await?;
        let command = truncate_with_marker(command, local_store::MAX_COMMAND_BYTES);
        let response = response.map(|r| truncate_with_marker(r, local_store::MAX_RESPONSE_BYTES));
        let now = now_secs();
        let table = scope.table_name();
        let sql = format!(
            "INSERT INTO {table} (request_id, command, response, status, user_id, machine_id, session_id, timestamp, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             RETURNING id"
        );
        let mut rows = conn
            .query(
                &sql,
                libsql::params![
                    meta.request_id,
                    command,
                    response,
                    HistoryStatus::Pending.as_str(),
                    meta.user_id,
                    meta.machine_id,
                    meta.session_id,
                    now
                ],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| RemoteStoreError::Sql("insert did not return an id".to_string()))?;
        Ok(row.get::<i64>(0)?)
    }

    /// Writes `command`/`response` into every table in `scopes`, one
    /// `save` per table (hybrid mode fans a write out to global + machine,
    /// and user when a user is set). Returns each table's `(scope, id)` so
    /// the caller can cache a fallback key per table for status-update
    /// retries.
    pub async fn save_fanout(
        &self,
        scopes: &[Scope],
        command: &str,
        response: Option<&str>,
        meta: NewRemoteCommand,
    ) -> Result<Vec<(Scope, i64)>> {
        let mut results = Vec::with_capacity(scopes.len());
        for &scope in scopes {
            let id = self.save(scope, command, response, meta.clone()).await?;
            results.push((scope, id));
        }
        Ok(results)
    }

    /// Fallback for `update_status_by_request_id` when it touches zero
    /// rows: targets one scope table directly by its cached `RETURNING id`.
    pub async fn update_status_by_id(
        &self,
        scope: Scope,
        id: i64,
        status: HistoryStatus,
        extras: StatusUpdateExtras,
    ) -> Result<u64> {
        let conn = self.connect().await?;
        let now = now_secs();
        let completed_at = status.is_terminal().then_some(now);
        let table = scope.table_name();
        let sql = format!(
            "UPDATE {table} SET status = ?1, updated_at = ?2, completed_at = COALESCE(?3, completed_at),
                 response = COALESCE(?4, response)
             WHERE id = ?5"
        );
        let rows = conn
            .execute(&sql, libsql::params![status.as_str(), now, completed_at, extras.response, id])
            .await?;
        Ok(rows)
    }

    /// Updates `status`, `updated_at`, and (for terminal states)
    /// `completed_at`, one statement per scope table. Each table's update
    /// is atomic; there's no cross-table transaction (the Remote schema
    /// keys each scope independently).
    pub async fn update_status_by_request_id(
        &self,
        request_id: &str,
        status: HistoryStatus,
        extras: StatusUpdateExtras,
    ) -> Result<u64> {
        let conn = self.connect().await?;
        let now = now_secs();
        let completed_at = status.is_terminal().then_some(now);
        let mut total_rows = 0u64;
        for table in ["history_global", "history_user", "history_machine"] {
            let sql = format!(
                "UPDATE {table} SET status = ?1, updated_at = ?2, completed_at = COALESCE(?3, completed_at),
                     response = COALESCE(?4, response)
                 WHERE request_id = ?5"
            );
            let rows = conn
                .execute(
                    &sql,
                    libsql::params![
                        status.as_str(),
                        now,
                        completed_at,
                        extras.response.clone(),
                        request_id
                    ],
                )
                .await?;
            total_rows += rows;
        }
        Ok(total_rows)
    }

    /// `hybrid` unions the three scopes and orders by `timestamp`; single
    /// scopes read straight from their table. Both forms are bounded below
    /// by `since` (pass [`HYBRID_WINDOW_DAYS`]-ago for "recent history",
    /// or `0` for "everything") - the caller owns the watermark, since
    /// `SyncEngine::download_phase` needs `lastSyncTime` rather than a
    /// fixed rolling window. Schema creation is the administrator's
    /// responsibility, so queries never rely on `SELECT *` column order -
    /// every column is named explicitly, matching [`HISTORY_COLUMNS`].
    pub async fn get_history(
        &self,
        scope: Scope,
        since: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryEntry>> {
        let conn = self.connect().await?;
        let sql = match scope {
            Scope::Hybrid => format!(
                "SELECT {cols} FROM (
                    SELECT {cols} FROM history_global WHERE timestamp >= ?1
                    UNION ALL SELECT {cols} FROM history_user WHERE timestamp >= ?1
                    UNION ALL SELECT {cols} FROM history_machine WHERE timestamp >= ?1
                 ) ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
                cols = HISTORY_COLUMNS,
            ),
            other => format!(
                "SELECT {cols} FROM {table} WHERE timestamp >= ?1 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
                cols = HISTORY_COLUMNS,
                table = other.table_name(),
            ),
        };
        let mut rows = conn.query(&sql, libsql::params![since, limit, offset]).await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_history_entry(&row)?);
        }
        Ok(entries)
    }

    /// `now - `[`HYBRID_WINDOW_DAYS`]` days`, the default "recent history"
    /// watermark used when a caller (e.g. `history-view`) has no sync
    /// watermark of its own to pass to [`RemoteStore::get_history`].
    pub fn default_window_since() -> i64 {
        now_secs() - HYBRID_WINDOW_DAYS * 86_400
    }

    /// Case-insensitive substring match over `command`/`response`, same
    /// shape as `LocalStore::search`.
    pub async fn search(&self, scope: Scope, query: &str, limit: i64, offset: i64) -> Result<Vec<HistoryEntry>> {
        let conn = self.connect().await?;
        let escaped = escape_like(query);
        let sql = match scope {
            Scope::Hybrid => format!(
                "SELECT {cols} FROM (
                    SELECT {cols} FROM history_global WHERE command LIKE '%' || ?1 || '%' ESCAPE '\\' OR response LIKE '%' || ?1 || '%' ESCAPE '\\'
                    UNION ALL SELECT {cols} FROM history_user WHERE command LIKE '%' || ?1 || '%' ESCAPE '\\' OR response LIKE '%' || ?1 || '%' ESCAPE '\\'
                    UNION ALL SELECT {cols} FROM history_machine WHERE command LIKE '%' || ?1 || '%' ESCAPE '\\' OR response LIKE '%' || ?1 || '%' ESCAPE '\\'
                 ) ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
                cols = HISTORY_COLUMNS,
            ),
            other => format!(
                "SELECT {cols} FROM {table}
                 WHERE command LIKE '%' || ?1 || '%' ESCAPE '\\' OR response LIKE '%' || ?1 || '%' ESCAPE '\\'
                 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
                cols = HISTORY_COLUMNS,
                table = other.table_name(),
            ),
        };
        let mut rows = conn.query(&sql, libsql::params![escaped, limit, offset]).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_history_entry(&row)?);
        }
        Ok(entries)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, username, name, email, active FROM users WHERE username = ?1",
                libsql::params![username],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(User {
                id: row.get::<i64>(0)?,
                username: row.get::<String>(1)?,
                name: row.get::<Option<String>>(2)?,
                email: row.get::<Option<String>>(3)?,
                active: row.get::<i64>(4)? != 0,
            })),
            None => Ok(None),
        }
    }

    /// Inserts a new `users` row. Usernames are unique; a duplicate
    /// fails with `RemoteStoreError::Sql` (the `UNIQUE` constraint
    /// message), there's no separate taken-username variant.
    pub async fn create_user(&self, username: &str, name: Option<&str>, email: Option<&str>) -> Result<User> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "INSERT INTO users (username, name, email, active) VALUES (?1, ?2, ?3, 1) RETURNING id",
                libsql::params![username, name, email],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| RemoteStoreError::Sql("insert did not return an id".to_string()))?;
        Ok(User {
            id: row.get::<i64>(0)?,
            username: username.to_string(),
            name: name.map(str::to_string),
            email: email.map(str::to_string),
            active: true,
        })
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query("SELECT id, username, name, email, active FROM users ORDER BY username", ())
            .await?;
        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(User {
                id: row.get::<i64>(0)?,
                username: row.get::<String>(1)?,
                name: row.get::<Option<String>>(2)?,
                email: row.get::<Option<String>>(3)?,
                active: row.get::<i64>(4)? != 0,
            });
        }
        Ok(users)
    }

    /// Flips `active`; used by both `delete` (deactivate, never a hard
    /// delete - history rows reference `user_id`) and `reactivate`.
    pub async fn set_user_active(&self, username: &str, active: bool) -> Result<()> {
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE users SET active = ?1 WHERE username = ?2",
            libsql::params![active as i64, username],
        )
        .await?;
        Ok(())
    }

    /// Total commands and most recent activity timestamp across all three
    /// history tables, for the `user stats` CLI subcommand.
    pub async fn user_stats(&self, user_id: i64) -> Result<UserStats> {
        let conn = self.connect().await?;
        let sql = "SELECT COUNT(*), MAX(timestamp) FROM (
                SELECT timestamp FROM history_global WHERE user_id = ?1
                UNION ALL SELECT timestamp FROM history_user WHERE user_id = ?1
                UNION ALL SELECT timestamp FROM history_machine WHERE user_id = ?1
            )";
        let mut rows = conn.query(sql, libsql::params![user_id]).await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| RemoteStoreError::Sql("stats query returned no row".to_string()))?;
        Ok(UserStats {
            total_commands: row.get::<i64>(0)?,
            last_activity: row.get::<Option<i64>>(1)?,
        })
    }
}

/// Parses a row positionally, in exactly the order of [`HISTORY_COLUMNS`].
fn row_to_history_entry(row: &libsql::Row) -> Result<HistoryEntry> {
    let status_str: String = row.get::<String>(4)?;
    let status: HistoryStatus = status_str
        .parse()
        .map_err(|e: String| RemoteStoreError::Sql(e))?;
    Ok(HistoryEntry {
        id: row
            .get::<Option<i64>>(0)?
            .map(|i| i.to_string())
            .unwrap_or_default(),
        request_id: row.get::<Option<String>>(1)?,
        command: row.get::<String>(2)?,
        response: row.get::<Option<String>>(3)?,
        status,
        user_id: row.get::<Option<i64>>(5)?,
        machine_id: row.get::<Option<String>>(6)?,
        session_id: row.get::<Option<String>>(7)?,
        timestamp: row.get::<i64>(8)?,
        updated_at: row.get::<Option<i64>>(9)?,
        completed_at: row.get::<Option<i64>>(10)?,
        tokens_used: row.get::<Option<i64>>(11)?,
        execution_time_ms: row.get::<Option<i64>>(12)?,
        sync_status: SyncStatus::Synced,
        last_synced: None,
    })
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn escape_like(query: &str) -> String {
    query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Test-only helpers. Administrator-provisioned schema is normally out of
/// this crate's hands (see `ensure_schema`); tests need a throwaway copy of
/// it to exercise real reads/writes against.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::RemoteStore;
    use crate::error::Result;

    const SCHEMA: &str = "
        CREATE TABLE users (id INTEGER PRIMARY KEY, username TEXT UNIQUE NOT NULL, name TEXT, email TEXT, active INTEGER NOT NULL DEFAULT 1);
        CREATE TABLE machines (machine_id TEXT PRIMARY KEY, hostname TEXT, ip TEXT, os_info TEXT, first_seen INTEGER, last_seen INTEGER, total_commands INTEGER);
        CREATE TABLE history_global (id INTEGER PRIMARY KEY AUTOINCREMENT, request_id TEXT, command TEXT NOT NULL, response TEXT, status TEXT NOT NULL, user_id INTEGER, machine_id TEXT, session_id TEXT, timestamp INTEGER NOT NULL, updated_at INTEGER, completed_at INTEGER, tokens_used INTEGER, execution_time_ms INTEGER);
        CREATE TABLE history_user (id INTEGER PRIMARY KEY AUTOINCREMENT, request_id TEXT, command TEXT NOT NULL, response TEXT, status TEXT NOT NULL, user_id INTEGER, machine_id TEXT, session_id TEXT, timestamp INTEGER NOT NULL, updated_at INTEGER, completed_at INTEGER, tokens_used INTEGER, execution_time_ms INTEGER);
        CREATE UNIQUE INDEX history_user_request_id ON history_user(request_id);
        CREATE TABLE history_machine (id INTEGER PRIMARY KEY AUTOINCREMENT, request_id TEXT, command TEXT NOT NULL, response TEXT, status TEXT NOT NULL, user_id INTEGER, machine_id TEXT, session_id TEXT, timestamp INTEGER NOT NULL, updated_at INTEGER, completed_at INTEGER, tokens_used INTEGER, execution_time_ms INTEGER);
        CREATE TABLE command_cache (key TEXT PRIMARY KEY, value TEXT);
        CREATE TABLE sessions (id TEXT PRIMARY KEY, user_id INTEGER, started_at INTEGER);
    ";

    pub async fn connect_in_memory_with_schema() -> Result<RemoteStore> {
        let store = RemoteStore::connect_in_memory().await?;
        let conn = store.connect().await?;
        conn.execute_batch(SCHEMA).await?;
        Ok(store)
    }
}

impl UserStore for RemoteStoreHandle {
    fn find_user_by_username(&self, username: &str) -> std::result::Result<Option<User>, IdentityError> {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current()
                .block_on(self.0.find_user_by_username(username))
                .map_err(|e| IdentityError::CacheIo(std::io::Error::other(e.to_string())))
        })
    }
}

/// Sync-trait adapter so `identity::resolve_user` (a sync function) can be
/// used against the inherently-async `RemoteStore` from a tokio context.
pub struct RemoteStoreHandle(pub Arc<RemoteStore>);
