/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use rusqlite::{
    types::{FromSql, ToSql},
    Connection, Result as SqlResult, Row, Savepoint, Transaction, TransactionBehavior,
};
use std::ops::Deref;
use std::time::Instant;

/// Extension methods shared by `Connection`, `Transaction` and `Savepoint`.
/// You must `use sql_support::ConnExt` to call these.
pub trait ConnExt {
    /// The method you need to implement to opt in to all of this.
    fn conn(&self) -> &Connection;

    /// Execute all the provided statements.
    fn execute_all(&self, stmts: &[&str]) -> SqlResult<()> {
        let conn = self.conn();
        for sql in stmts {
            conn.execute(sql, ())?;
        }
        Ok(())
    }

    /// Like `Connection::execute`, but uses a cached prepared statement, so
    /// repeated calls with the same SQL text avoid re-parsing it.
    fn execute_cached(&self, sql: &str, params: &[&dyn ToSql]) -> SqlResult<usize> {
        let mut stmt = self.conn().prepare_cached(sql)?;
        stmt.execute(params)
    }

    /// Like `execute_cached` but with named parameters.
    fn execute_named_cached(&self, sql: &str, params: &[(&str, &dyn ToSql)]) -> SqlResult<usize> {
        let mut stmt = self.conn().prepare_cached(sql)?;
        stmt.execute(params)
    }

    /// Execute a query that returns a single result column, and return that result.
    fn query_one<T: FromSql>(&self, sql: &str) -> SqlResult<T> {
        self.conn().query_row(sql, (), |row| row.get(0))
    }

    /// Like `Connection::query_row` but with named parameters, and a flag
    /// to indicate whether the statement should be cached.
    fn query_row_and_then_named<T, E, F>(
        &self,
        sql: &str,
        params: &[(&str, &dyn ToSql)],
        mapper: F,
        cache: bool,
    ) -> Result<T, E>
    where
        Self: Sized,
        E: From<rusqlite::Error>,
        F: FnOnce(&Row<'_>) -> Result<T, E>,
    {
        self.try_query_row(sql, params, mapper, cache)?
            .ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
    }

    /// Like `query_row_and_then_named`, but returns `None` instead of erroring
    /// if no such row exists.
    fn try_query_row<T, E, F>(
        &self,
        sql: &str,
        params: &[(&str, &dyn ToSql)],
        mapper: F,
        cache: bool,
    ) -> Result<Option<T>, E>
    where
        Self: Sized,
        E: From<rusqlite::Error>,
        F: FnOnce(&Row<'_>) -> Result<T, E>,
    {
        let conn = self.conn();
        if cache {
            let mut stmt = conn.prepare_cached(sql)?;
            let mut rows = stmt.query(params)?;
            Ok(match rows.next()? {
                None => None,
                Some(row) => Some(mapper(row)?),
            })
        } else {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(params)?;
            Ok(match rows.next()? {
                None => None,
                Some(row) => Some(mapper(row)?),
            })
        }
    }

    fn unchecked_transaction(&self) -> SqlResult<UncheckedTransaction<'_>> {
        UncheckedTransaction::new(self.conn(), TransactionBehavior::Deferred)
    }

    /// Set a pragma that takes an integer value, e.g. `user_version`.
    fn set_pragma(&self, name: &str, value: u32) -> SqlResult<()> {
        self.conn()
            .pragma_update(None, name, value)
    }
}

impl ConnExt for Connection {
    #[inline]
    fn conn(&self) -> &Connection {
        self
    }
}

impl ConnExt for Transaction<'_> {
    #[inline]
    fn conn(&self) -> &Connection {
        self
    }
}

impl ConnExt for Savepoint<'_> {
    #[inline]
    fn conn(&self) -> &Connection {
        self
    }
}

/// rusqlite, in an attempt to save us from ourselves, needs a mutable ref to
/// a connection to start a transaction. That's a PITA when several call
/// sites share an immutable `&Connection`, so we offer this as an
/// alternative - the responsibility of ensuring there are no concurrent
/// transactions is on the caller.
pub struct UncheckedTransaction<'conn> {
    conn: &'conn Connection,
    started_at: Instant,
}

impl<'conn> UncheckedTransaction<'conn> {
    /// Begin a new unchecked transaction. Cannot be nested, but this is not
    /// enforced (hence 'unchecked'); use a rusqlite `savepoint` for nested
    /// transactions.
    pub fn new(conn: &'conn Connection, behavior: TransactionBehavior) -> SqlResult<Self> {
        let query = match behavior {
            TransactionBehavior::Deferred => "BEGIN DEFERRED",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
            _ => "BEGIN DEFERRED",
        };
        conn.execute_batch(query)?;
        Ok(UncheckedTransaction {
            conn,
            started_at: Instant::now(),
        })
    }

    /// Consumes and commits an unchecked transaction.
    pub fn commit(self) -> SqlResult<()> {
        self.conn.execute_batch("COMMIT")?;
        log::trace!("transaction committed after {:?}", self.started_at.elapsed());
        Ok(())
    }

    /// Consumes and rolls back an unchecked transaction.
    pub fn rollback(self) -> SqlResult<()> {
        self.rollback_()
    }

    fn rollback_(&self) -> SqlResult<()> {
        self.conn.execute_batch("ROLLBACK")
    }

    fn finish_(&self) -> SqlResult<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.rollback_()
    }
}

impl Deref for UncheckedTransaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Drop for UncheckedTransaction<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.finish_() {
            log::warn!("error dropping an unchecked transaction: {e}");
        }
    }
}

impl ConnExt for UncheckedTransaction<'_> {
    #[inline]
    fn conn(&self) -> &Connection {
        self.conn
    }
}
