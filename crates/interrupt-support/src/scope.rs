/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::Interruptee;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token for a single request.
///
/// Where the teacher's `InterruptScope` is one global counter shared by
/// every sync engine in a process, a `TaskToken` is scoped to one
/// `request_id`: `request-controller` hands a clone to the AI call task and
/// keeps the other half in its active-request map, so cancelling one
/// request can never affect another in-flight one.
///
/// As with the teacher's type, this only works with code that actively
/// checks `was_interrupted()`/`err_if_interrupted()` between steps - it
/// can't reach into a blocked syscall. For database writes that need to be
/// aborted mid-query, pair this with a [`crate::SqlInterruptHandle`].
#[derive(Clone, Debug, Default)]
pub struct TaskToken {
    interrupted: Arc<AtomicBool>,
}

impl TaskToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this token, and every clone of it, as interrupted.
    #[inline]
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }
}

impl Interruptee for TaskToken {
    #[inline]
    fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }
}

/// A convenience implementation, should only be used in tests.
pub struct NeverInterrupts;

impl Interruptee for NeverInterrupts {
    #[inline]
    fn was_interrupted(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_token_is_not_interrupted() {
        let token = TaskToken::new();
        assert!(!token.was_interrupted());
        assert!(token.err_if_interrupted().is_ok());
    }

    #[test]
    fn interrupt_is_visible_to_clones() {
        let token = TaskToken::new();
        let clone = token.clone();
        token.interrupt();
        assert!(clone.was_interrupted());
        assert!(clone.err_if_interrupted().is_err());
    }

    #[test]
    fn independent_tokens_do_not_affect_each_other() {
        let a = TaskToken::new();
        let b = TaskToken::new();
        a.interrupt();
        assert!(a.was_interrupted());
        assert!(!b.was_interrupted());
    }
}
