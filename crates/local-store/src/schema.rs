/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! `local-store`'s schema: `history_cache`, `sync_queue`, `sync_metadata`,
//! `conflict_log`, plus the `machines` table that backs
//! `identity::MachineStore`. One-shot creation only; `local-store` is a
//! disposable cache, so a failed migration just recreates the file rather
//! than attempting to preserve data (see `sql_support::open_database`'s
//! `ErrorHandling::DeleteAndRecreate`).

use rusqlite::Connection;
use sql_support::open_database::{self, ErrorHandling, MigrationLogic};

pub const VERSION: u32 = 1;

pub fn migration_logic() -> MigrationLogic {
    MigrationLogic {
        name: "local-store".to_string(),
        start_version: VERSION,
        end_version: VERSION,
        prepare: None,
        init,
        upgrades: Vec::new(),
        finish: None,
        error_handling: ErrorHandling::DeleteAndRecreate,
    }
}

fn init(conn: &Connection) -> open_database::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE history_cache (
            id                 TEXT PRIMARY KEY NOT NULL,
            request_id         TEXT,
            command            TEXT NOT NULL,
            response           TEXT,
            status             TEXT NOT NULL,
            user_id            INTEGER,
            machine_id         TEXT,
            session_id         TEXT,
            timestamp          INTEGER NOT NULL,
            updated_at         INTEGER,
            completed_at       INTEGER,
            tokens_used        INTEGER,
            execution_time_ms  INTEGER,
            sync_status        TEXT NOT NULL DEFAULT 'pending',
            last_synced        INTEGER
        );
        CREATE INDEX idx_history_timestamp ON history_cache(timestamp DESC);
        CREATE INDEX idx_history_user ON history_cache(user_id);
        CREATE INDEX idx_history_machine ON history_cache(machine_id);
        CREATE INDEX idx_history_sync_status ON history_cache(sync_status);
        CREATE INDEX idx_history_request_id ON history_cache(request_id);

        CREATE TABLE sync_queue (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            op          TEXT NOT NULL,
            table_name  TEXT NOT NULL,
            record_id   TEXT NOT NULL,
            payload     TEXT NOT NULL,
            priority    INTEGER NOT NULL DEFAULT 0,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error  TEXT,
            created_at  INTEGER NOT NULL
        );
        CREATE INDEX idx_sync_queue_priority ON sync_queue(priority DESC, created_at ASC);

        CREATE TABLE sync_metadata (
            key   TEXT PRIMARY KEY NOT NULL,
            value TEXT
        );

        CREATE TABLE conflict_log (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            command_uuid TEXT NOT NULL,
            local_data   TEXT NOT NULL,
            remote_data  TEXT NOT NULL,
            resolution   TEXT NOT NULL,
            resolved_at  INTEGER NOT NULL
        );
        CREATE INDEX idx_conflict_log_command_uuid ON conflict_log(command_uuid);

        CREATE TABLE machines (
            machine_id     TEXT PRIMARY KEY NOT NULL,
            hostname       TEXT NOT NULL,
            ip             TEXT,
            os_info        TEXT NOT NULL,
            first_seen     INTEGER NOT NULL,
            last_seen      INTEGER NOT NULL,
            total_commands INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;
    Ok(())
}
