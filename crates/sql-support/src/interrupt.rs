/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use interrupt_support::SqlInterruptHandle;
use rusqlite::Connection;

/// Pairs a connection's `SqlInterruptHandle` with a place to stash it, so a
/// store can hand out interrupt handles for a connection it opened earlier
/// without plumbing the handle through every caller.
#[derive(Default)]
pub struct InterruptRegistry {
    handle: Option<SqlInterruptHandle>,
}

impl InterruptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn: &Connection) -> SqlInterruptHandle {
        let handle = SqlInterruptHandle::new(conn);
        self.handle = Some(handle.clone());
        handle
    }

    pub fn handle(&self) -> Option<SqlInterruptHandle> {
        self.handle.clone()
    }
}
