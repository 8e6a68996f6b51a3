/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Interruption primitives shared by `request-controller`, `sync-engine`
//! and `local-store`.
//!
//! The teacher's `interrupt-support` crate gives every long-running
//! operation a single global [`InterruptScope`] counter. A terminal
//! assistant juggles many independent in-flight requests at once, each of
//! which needs its own, independently cancellable token, so this crate
//! generalizes the teacher's counter into a per-request [`TaskToken`] while
//! keeping the same `Interruptee`/`err_if_interrupted` ergonomics. The
//! SQLite-specific half ([`SqlInterruptHandle`]) is new: it wraps
//! `rusqlite::InterruptHandle` so a request can also abort an in-flight
//! database write, not just stop checking a flag between steps.

mod scope;
mod sql;

pub use scope::{NeverInterrupts, TaskToken};
#[cfg(feature = "rusqlite")]
pub use sql::SqlInterruptHandle;

/// Represents the state of something that may be interrupted. Decoupled
/// from the thing doing the interrupting so that code which wants to check
/// whether it has been interrupted doesn't need to know about the
/// mechanics of who's doing the interrupting.
pub trait Interruptee {
    fn was_interrupted(&self) -> bool;

    fn err_if_interrupted(&self) -> Result<(), Interrupted> {
        if self.was_interrupted() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

/// The error returned by `err_if_interrupted`.
#[derive(Debug, thiserror::Error)]
#[error("the operation was interrupted")]
pub struct Interrupted;
