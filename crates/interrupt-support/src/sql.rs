/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lets a request abort a write that's currently running against
/// `local-store`'s SQLite connection, not just stop checking a flag
/// between steps.
///
/// `rusqlite::InterruptHandle::interrupt()` affects whatever query is
/// running on the connection *right now*, which is fine as long as the
/// handle is only interrupted while the request that owns it is actually
/// the one holding the connection. Since `local-store` serializes writes
/// behind a single mutex-guarded connection, a handle obtained for one
/// request could otherwise race ahead and cancel some unrelated request's
/// write. `arm`/`disarm` close that window: `interrupt()` is a no-op
/// unless the handle has been armed, and `local-store` only arms it for
/// the duration of the write it was created for.
#[derive(Clone)]
pub struct SqlInterruptHandle {
    handle: Arc<rusqlite::InterruptHandle>,
    armed: Arc<AtomicBool>,
}

impl SqlInterruptHandle {
    pub fn new(conn: &rusqlite::Connection) -> Self {
        Self {
            handle: Arc::new(conn.get_interrupt_handle()),
            armed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Allow `interrupt()` to take effect. Call immediately before
    /// starting the write this handle guards.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Stop `interrupt()` from taking effect. Call as soon as the guarded
    /// write completes, successfully or not.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Interrupt the connection's current query, if this handle is armed.
    pub fn interrupt(&self) {
        if self.armed.load(Ordering::SeqCst) {
            self.handle.interrupt();
        }
    }
}

impl std::fmt::Debug for SqlInterruptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlInterruptHandle")
            .field("armed", &self.armed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn disarmed_interrupt_is_a_noop() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let handle = SqlInterruptHandle::new(&conn);
        // Should not panic or otherwise affect the connection.
        handle.interrupt();
        conn.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
    }

    #[test]
    fn arm_disarm_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let handle = SqlInterruptHandle::new(&conn);
        handle.arm();
        handle.disarm();
        handle.interrupt();
        conn.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
    }
}
