/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use rusqlite::{limits::Limit, types::ToSql};

/// Returns `SQLITE_LIMIT_VARIABLE_NUMBER`, read from a throwaway in-memory
/// connection and cached. Wrong if some other connection in the process
/// lowers this at runtime, which nothing here does.
pub fn default_max_variable_number() -> usize {
    lazy_static::lazy_static! {
        static ref MAX_VARIABLE_NUMBER: usize = {
            let conn = rusqlite::Connection::open_in_memory()
                .expect("failed to open in-memory connection to read SQLITE_LIMIT_VARIABLE_NUMBER");
            let limit = conn
                .limit(Limit::SQLITE_LIMIT_VARIABLE_NUMBER)
                .expect("failed to read SQLITE_LIMIT_VARIABLE_NUMBER");
            assert!(limit > 0, "illegal SQLITE_LIMIT_VARIABLE_NUMBER: {limit}");
            limit as usize
        };
    }
    *MAX_VARIABLE_NUMBER
}

/// Splits `items` into chunks no larger than `default_max_variable_number()`
/// and calls `do_chunk` with each chunk plus its offset from the start.
/// Useful for `WHERE id IN (...)` queries over an id list of unknown length,
/// e.g. `local-store`'s batched `MarkSynced`/`ClearSyncQueue`.
pub fn each_chunk<T, E, F>(items: &[T], mut do_chunk: F) -> Result<(), E>
where
    T: ToSql,
    F: FnMut(&[&dyn ToSql], usize) -> Result<(), E>,
{
    let chunk_size = default_max_variable_number();
    if items.is_empty() {
        return Ok(());
    }
    let mut offset = 0;
    for chunk in items.chunks(chunk_size) {
        let refs: Vec<&dyn ToSql> = chunk.iter().map(|t| t as &dyn ToSql).collect();
        do_chunk(&refs, offset)?;
        offset += chunk.len();
    }
    Ok(())
}

/// Builds a `(?, ?, ?)`-style placeholder group sized to `count` for use in
/// a dynamically sized `IN (...)` clause.
pub fn sql_vars(count: usize) -> String {
    let mut s = String::with_capacity(count * 2 + 2);
    s.push('(');
    for i in 0..count {
        if i > 0 {
            s.push(',');
        }
        s.push('?');
    }
    s.push(')');
    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn each_chunk_covers_every_item() {
        let items: Vec<i64> = (0..10).collect();
        let mut seen = Vec::new();
        each_chunk::<_, rusqlite::Error, _>(&items, |chunk, offset| {
            seen.push((offset, chunk.len()));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(0, 10)]);
    }

    #[test]
    fn sql_vars_builds_placeholder_list() {
        assert_eq!(sql_vars(3), "(?,?,?)");
        assert_eq!(sql_vars(1), "(?)");
    }
}
