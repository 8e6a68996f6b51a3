/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::error::{LocalStoreError, Result};
use crate::model::{
    truncate_with_marker, ConflictLogEntry, HistoryEntry, HistoryFilter, HistoryStatus,
    NewCommandMeta, SyncQueueItem, SyncStatus, MAX_COMMAND_BYTES, MAX_ERROR_CHARS,
    MAX_RESPONSE_BYTES,
};
use crate::schema;
use identity::{IdentityError, Machine, MachineInfo, MachineStore};
use interrupt_support::SqlInterruptHandle;
use rusqlite::{named_params, Connection, Row};
use sql_support::{each_chunk, open_database, ConnExt};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

/// Embedded SQL store: history, sync queue, metadata, conflict log. Opens
/// with WAL journaling and `synchronous=NORMAL`, mirroring the teacher's
/// `LoginDb::with_connection` pragma setup.
pub struct LocalStore {
    conn: Connection,
    interrupt_handle: Arc<SqlInterruptHandle>,
}

impl LocalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(open_database::open_database(
            path.as_ref().to_path_buf(),
            schema::migration_logic(),
        )?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(open_database::test_utils::open_memory_database(
            schema::migration_logic(),
        )?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", (), |row| row.get(0))?;
        Ok(Self {
            interrupt_handle: Arc::new(SqlInterruptHandle::new(&conn)),
            conn,
        })
    }

    pub fn new_interrupt_handle(&self) -> Arc<SqlInterruptHandle> {
        Arc::clone(&self.interrupt_handle)
    }

    /// Inserts or replaces by `command_uuid`. Enqueues an `insert` op in
    /// `sync_queue` unless `meta.already_synced` is set, in which case the
    /// caller (typically `RequestController::persist_pending`, after its
    /// own Remote fanout write already succeeded) has taken care of Remote
    /// itself and a queued upload would just produce a second row or a
    /// unique-constraint error there. Returns the generated `id`.
    pub fn save_command(
        &self,
        command: &str,
        response: Option<&str>,
        meta: NewCommandMeta,
    ) -> Result<String> {
        if command.trim().is_empty() {
            return Err(LocalStoreError::BadInput);
        }
        let command = truncate_with_marker(command, MAX_COMMAND_BYTES);
        let response = response.map(|r| truncate_with_marker(r, MAX_RESPONSE_BYTES));
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = now_secs();
        let sync_status = if meta.already_synced { SyncStatus::Synced } else { SyncStatus::Pending };
        let last_synced = meta.already_synced.then_some(now);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO history_cache (
                id, request_id, command, response, status, user_id, machine_id,
                session_id, timestamp, updated_at, completed_at, tokens_used,
                execution_time_ms, sync_status, last_synced
            ) VALUES (
                :id, :request_id, :command, :response, :status, :user_id, :machine_id,
                :session_id, :timestamp, :timestamp, NULL, NULL,
                NULL, :sync_status, :last_synced
            )",
            named_params! {
                ":id": id,
                ":request_id": meta.request_id,
                ":command": command,
                ":response": response,
                ":status": HistoryStatus::Pending,
                ":user_id": meta.user_id,
                ":machine_id": meta.machine_id,
                ":session_id": meta.session_id,
                ":timestamp": now,
                ":sync_status": sync_status,
                ":last_synced": last_synced,
            },
        )?;

        if !meta.already_synced {
            let payload = serde_json::to_string(&serde_json::json!({ "id": id, "command": command }))?;
            tx.execute(
                "INSERT INTO sync_queue (op, table_name, record_id, payload, priority, retry_count, created_at)
                 VALUES ('insert', 'history_cache', :record_id, :payload, 0, 0, :now)",
                named_params! { ":record_id": id, ":payload": payload, ":now": now },
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    /// Newest-first, filterable by `user_id`/`machine_id`.
    pub fn get_history(
        &self,
        filter: &HistoryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryEntry>> {
        let mut sql = "SELECT * FROM history_cache WHERE 1=1".to_string();
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = :user_id");
        }
        if filter.machine_id.is_some() {
            sql.push_str(" AND machine_id = :machine_id");
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT :limit OFFSET :offset");

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            named_params! {
                ":user_id": filter.user_id,
                ":machine_id": filter.machine_id,
                ":limit": limit,
                ":offset": offset,
            },
            row_to_history_entry,
        )?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    /// Case-insensitive substring match over `command`/`response`,
    /// newest-first. Grounded on the teacher's `LIKE ? || '%'` pattern in
    /// `components/example/src/db.rs`, extended to both ends and both
    /// columns.
    pub fn search(&self, query: &str, filter: &HistoryFilter, limit: i64) -> Result<Vec<HistoryEntry>> {
        let mut sql = "SELECT * FROM history_cache
             WHERE (command LIKE '%' || :q || '%' ESCAPE '\\' OR response LIKE '%' || :q || '%' ESCAPE '\\')"
            .to_string();
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = :user_id");
        }
        if filter.machine_id.is_some() {
            sql.push_str(" AND machine_id = :machine_id");
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT :limit");

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            named_params! {
                ":q": escape_like(query),
                ":user_id": filter.user_id,
                ":machine_id": filter.machine_id,
                ":limit": limit,
            },
            row_to_history_entry,
        )?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    /// Ordered by `(priority DESC, created_at ASC)`, skipping items whose
    /// `retry_count >= max_retries`.
    pub fn get_pending_sync(&self, limit: i64, max_retries: i64) -> Result<Vec<SyncQueueItem>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, op, table_name, record_id, payload, priority, retry_count, last_error, created_at
             FROM sync_queue
             WHERE retry_count < :max_retries
             ORDER BY priority DESC, created_at ASC
             LIMIT :limit",
        )?;
        let rows = stmt.query_map(
            named_params! { ":max_retries": max_retries, ":limit": limit },
            |row| {
                Ok(SyncQueueItem {
                    id: row.get(0)?,
                    op: row.get(1)?,
                    table: row.get(2)?,
                    record_id: row.get(3)?,
                    payload: row.get(4)?,
                    priority: row.get(5)?,
                    retry_count: row.get(6)?,
                    last_error: row.get(7)?,
                    created_at: row.get(8)?,
                })
            },
        )?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    /// Marks `history_cache` rows synced. Transactional with
    /// `clear_sync_queue` when called via [`LocalStore::finish_sync_batch`].
    pub fn mark_synced(&self, uuids: &[String]) -> Result<()> {
        let now = now_secs();
        each_chunk(uuids, |chunk, _offset| -> rusqlite::Result<()> {
            let placeholders = sql_support::sql_vars(chunk.len());
            let sql = format!(
                "UPDATE history_cache SET sync_status = 'synced', last_synced = ? WHERE id IN {placeholders}"
            );
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&now];
            params.extend_from_slice(chunk);
            self.conn.execute(&sql, params.as_slice())?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn clear_sync_queue(&self, ids: &[i64]) -> Result<()> {
        each_chunk(ids, |chunk, _offset| -> rusqlite::Result<()> {
            let placeholders = sql_support::sql_vars(chunk.len());
            let sql = format!("DELETE FROM sync_queue WHERE id IN {placeholders}");
            self.conn.execute(&sql, chunk)?;
            Ok(())
        })?;
        Ok(())
    }

    /// `mark_synced` + `clear_sync_queue` in one transaction, per spec
    /// §4.6's "transactionally".
    pub fn finish_sync_batch(&self, uuids: &[String], ids: &[i64]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let now = now_secs();
        each_chunk(uuids, |chunk, _offset| -> rusqlite::Result<()> {
            let placeholders = sql_support::sql_vars(chunk.len());
            let sql = format!(
                "UPDATE history_cache SET sync_status = 'synced', last_synced = ? WHERE id IN {placeholders}"
            );
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&now];
            params.extend_from_slice(chunk);
            tx.execute(&sql, params.as_slice())?;
            Ok(())
        })?;
        each_chunk(ids, |chunk, _offset| -> rusqlite::Result<()> {
            let placeholders = sql_support::sql_vars(chunk.len());
            let sql = format!("DELETE FROM sync_queue WHERE id IN {placeholders}");
            tx.execute(&sql, chunk)?;
            Ok(())
        })?;
        tx.commit()?;
        Ok(())
    }

    pub fn increment_retry_count(&self, id: i64, err: &str) -> Result<()> {
        let err = truncate_with_marker(err, MAX_ERROR_CHARS);
        self.conn.execute(
            "UPDATE sync_queue SET retry_count = retry_count + 1, last_error = :err WHERE id = :id",
            named_params! { ":err": err, ":id": id },
        )?;
        Ok(())
    }

    /// Idempotent insert-or-ignore by `command_uuid`; imported rows are
    /// marked `synced`.
    pub fn import_history(&self, entries: &[HistoryEntry]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut imported = 0;
        for entry in entries {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO history_cache (
                    id, request_id, command, response, status, user_id, machine_id,
                    session_id, timestamp, updated_at, completed_at, tokens_used,
                    execution_time_ms, sync_status, last_synced
                ) VALUES (
                    :id, :request_id, :command, :response, :status, :user_id, :machine_id,
                    :session_id, :timestamp, :updated_at, :completed_at, :tokens_used,
                    :execution_time_ms, 'synced', :last_synced
                )",
                named_params! {
                    ":id": entry.id,
                    ":request_id": entry.request_id,
                    ":command": entry.command,
                    ":response": entry.response,
                    ":status": entry.status,
                    ":user_id": entry.user_id,
                    ":machine_id": entry.machine_id,
                    ":session_id": entry.session_id,
                    ":timestamp": entry.timestamp,
                    ":updated_at": entry.updated_at,
                    ":completed_at": entry.completed_at,
                    ":tokens_used": entry.tokens_used,
                    ":execution_time_ms": entry.execution_time_ms,
                    ":last_synced": now_secs(),
                },
            )?;
            imported += changed;
        }
        tx.commit()?;
        Ok(imported)
    }

    /// Deletes synced rows older than `days_to_keep`.
    pub fn cleanup(&self, days_to_keep: i64) -> Result<usize> {
        let threshold = now_secs() - days_to_keep * 86_400;
        let deleted = self.conn.execute(
            "DELETE FROM history_cache WHERE sync_status = 'synced' AND timestamp < :threshold",
            named_params! { ":threshold": threshold },
        )?;
        Ok(deleted)
    }

    pub fn record_conflict(&self, entry: &ConflictLogEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conflict_log (command_uuid, local_data, remote_data, resolution, resolved_at)
             VALUES (:command_uuid, :local_data, :remote_data, :resolution, :resolved_at)",
            named_params! {
                ":command_uuid": entry.command_uuid,
                ":local_data": entry.local_data,
                ":remote_data": entry.remote_data,
                ":resolution": entry.resolution,
                ":resolved_at": entry.resolved_at,
            },
        )?;
        Ok(())
    }

    /// Updates `status`, `updated_at`, and (for terminal states)
    /// `completed_at` for the row carrying `request_id`, optionally
    /// overriding `response`. Mirrors `RemoteStore::update_status_by_request_id`
    /// so RequestController can keep both stores' audit trail in lockstep.
    pub fn update_status_by_request_id(
        &self,
        request_id: &str,
        status: HistoryStatus,
        response: Option<&str>,
    ) -> Result<usize> {
        let now = now_secs();
        let completed_at = status.is_terminal().then_some(now);
        let response = response.map(|r| truncate_with_marker(r, MAX_RESPONSE_BYTES));
        let changed = self.conn.execute(
            "UPDATE history_cache SET status = :status, updated_at = :now,
                 completed_at = COALESCE(:completed_at, completed_at),
                 response = COALESCE(:response, response)
             WHERE request_id = :request_id",
            named_params! {
                ":status": status,
                ":now": now,
                ":completed_at": completed_at,
                ":response": response,
                ":request_id": request_id,
            },
        )?;
        Ok(changed)
    }

    pub fn get_by_request_id(&self, request_id: &str) -> Result<Option<HistoryEntry>> {
        self.conn
            .query_row(
                "SELECT * FROM history_cache WHERE request_id = :request_id",
                named_params! { ":request_id": request_id },
                row_to_history_entry,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<HistoryEntry>> {
        self.conn
            .query_row(
                "SELECT * FROM history_cache WHERE id = :id",
                named_params! { ":id": id },
                row_to_history_entry,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    pub fn sync_metadata_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.conn.try_query_row(
            "SELECT value FROM sync_metadata WHERE key = :key",
            &[(":key", &key as &dyn rusqlite::types::ToSql)],
            |row| Ok::<_, rusqlite::Error>(row.get(0)?),
            true,
        )?)
    }

    pub fn sync_metadata_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute_named_cached(
            "REPLACE INTO sync_metadata (key, value) VALUES (:key, :value)",
            &[
                (":key", &key as &dyn rusqlite::types::ToSql),
                (":value", &value as &dyn rusqlite::types::ToSql),
            ],
        )?;
        Ok(())
    }
}

impl ConnExt for LocalStore {
    #[inline]
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl Deref for LocalStore {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl MachineStore for LocalStore {
    fn upsert_machine(&self, info: &MachineInfo) -> std::result::Result<Machine, IdentityError> {
        let now = now_secs();
        self.conn
            .execute(
                "INSERT INTO machines (machine_id, hostname, ip, os_info, first_seen, last_seen, total_commands)
                 VALUES (:machine_id, :hostname, :ip, :os_info, :now, :now, 0)
                 ON CONFLICT(machine_id) DO UPDATE SET
                     hostname = excluded.hostname,
                     ip = excluded.ip,
                     os_info = excluded.os_info,
                     last_seen = excluded.last_seen",
                named_params! {
                    ":machine_id": info.machine_id,
                    ":hostname": info.hostname,
                    ":ip": info.ip,
                    ":os_info": info.os_info,
                    ":now": now,
                },
            )
            .map_err(identity_io_err)?;

        self.conn
            .query_row(
                "SELECT machine_id, hostname, ip, os_info, first_seen, last_seen, total_commands
                 FROM machines WHERE machine_id = :machine_id",
                named_params! { ":machine_id": info.machine_id },
                |row| {
                    Ok(Machine {
                        machine_id: row.get(0)?,
                        hostname: row.get(1)?,
                        ip: row.get(2)?,
                        os_info: row.get(3)?,
                        first_seen: row.get(4)?,
                        last_seen: row.get(5)?,
                        total_commands: row.get(6)?,
                    })
                },
            )
            .map_err(identity_io_err)
    }
}

fn identity_io_err(e: rusqlite::Error) -> IdentityError {
    IdentityError::CacheIo(std::io::Error::other(e.to_string()))
}

fn row_to_history_entry(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.get("id")?,
        request_id: row.get("request_id")?,
        command: row.get("command")?,
        response: row.get("response")?,
        status: row.get("status")?,
        user_id: row.get("user_id")?,
        machine_id: row.get("machine_id")?,
        session_id: row.get("session_id")?,
        timestamp: row.get("timestamp")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
        tokens_used: row.get("tokens_used")?,
        execution_time_ms: row.get("execution_time_ms")?,
        sync_status: row.get("sync_status")?,
        last_synced: row.get("last_synced")?,
    })
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Escapes `%`/`_`/`\` so a search query can't smuggle in its own LIKE
/// wildcards.
fn escape_like(query: &str) -> String {
    query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn save_command_rejects_empty_input() {
        let store = LocalStore::open_in_memory().unwrap();
        assert!(matches!(
            store.save_command("   ", None, NewCommandMeta::default()),
            Err(LocalStoreError::BadInput)
        ));
    }

    #[test]
    fn save_command_enqueues_sync_item() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = store
            .save_command("list files", None, NewCommandMeta::default())
            .unwrap();
        let pending = store.get_pending_sync(10, 5).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record_id, id);

        let entry = store.get_by_id(&id).unwrap().unwrap();
        assert_eq!(entry.status, HistoryStatus::Pending);
        assert_eq!(entry.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn finish_sync_batch_marks_synced_and_clears_queue() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = store
            .save_command("list files", None, NewCommandMeta::default())
            .unwrap();
        let pending = store.get_pending_sync(10, 5).unwrap();
        let queue_ids: Vec<i64> = pending.iter().map(|i| i.id).collect();

        store
            .finish_sync_batch(&[id.clone()], &queue_ids)
            .unwrap();

        assert!(store.get_pending_sync(10, 5).unwrap().is_empty());
        let entry = store.get_by_id(&id).unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn import_history_is_idempotent() {
        let store = LocalStore::open_in_memory().unwrap();
        let entry = HistoryEntry {
            id: "abc123".to_string(),
            request_id: Some("req_1_000000001".to_string()),
            command: "ls".to_string(),
            response: Some("file.txt".to_string()),
            status: HistoryStatus::Completed,
            user_id: None,
            machine_id: None,
            session_id: None,
            timestamp: 100,
            updated_at: Some(100),
            completed_at: Some(100),
            tokens_used: None,
            execution_time_ms: None,
            sync_status: SyncStatus::Synced,
            last_synced: None,
        };
        store.import_history(&[entry.clone()]).unwrap();
        store.import_history(&[entry]).unwrap();

        let history = store.get_history(&HistoryFilter::default(), 10, 0).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn cleanup_deletes_old_synced_rows_only() {
        let store = LocalStore::open_in_memory().unwrap();
        let old = HistoryEntry {
            id: "old".to_string(),
            request_id: None,
            command: "old".to_string(),
            response: None,
            status: HistoryStatus::Completed,
            user_id: None,
            machine_id: None,
            session_id: None,
            timestamp: now_secs() - 40 * 86_400,
            updated_at: None,
            completed_at: None,
            tokens_used: None,
            execution_time_ms: None,
            sync_status: SyncStatus::Synced,
            last_synced: None,
        };
        store.import_history(&[old]).unwrap();
        let id = store
            .save_command("recent", None, NewCommandMeta::default())
            .unwrap();

        let deleted = store.cleanup(30).unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_by_id("old").unwrap().is_none());
        assert!(store.get_by_id(&id).unwrap().is_some());
    }

    #[test]
    fn upsert_machine_refreshes_last_seen() {
        let store = LocalStore::open_in_memory().unwrap();
        let info = MachineInfo {
            machine_id: "deadbeef".to_string(),
            hostname: "host-a".to_string(),
            ip: Some("10.0.0.1".to_string()),
            os_info: "linux-x86_64".to_string(),
        };
        let first = store.upsert_machine(&info).unwrap();
        let info2 = MachineInfo {
            hostname: "host-b".to_string(),
            ..info
        };
        let second = store.upsert_machine(&info2).unwrap();
        assert_eq!(first.machine_id, second.machine_id);
        assert_eq!(second.hostname, "host-b");
    }
}
