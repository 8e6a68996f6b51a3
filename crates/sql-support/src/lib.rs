/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Shared SQLite plumbing for `local-store`: connection-extension methods,
//! a versioned migration harness, and chunking helpers for `IN (...)`
//! queries, adapted from the teacher's `sql-support` crate.

mod conn_ext;
mod each_chunk;
mod interrupt;
pub mod open_database;

pub use conn_ext::{ConnExt, UncheckedTransaction};
pub use each_chunk::{default_max_variable_number, each_chunk, sql_vars};
pub use interrupt::InterruptRegistry;
