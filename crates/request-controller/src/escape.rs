/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::time::{Duration, Instant};

const DOUBLE_ESC_WINDOW: Duration = Duration::from_millis(500);

/// Tracks ESC keypress timing so the UI can tell a single cancel-request
/// press from a double-press-clears-the-input-buffer gesture. Owned by the
/// UI layer (terminal I/O is out of scope here); `record` is the whole
/// contract.
#[derive(Default)]
pub struct EscapeTracker {
    last_esc: Option<Instant>,
}

impl EscapeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this press lands within [`DOUBLE_ESC_WINDOW`] of
    /// the previous one (clear-input gesture, no effect on request state),
    /// `false` if it's a fresh single press (cancel gesture).
    pub fn record(&mut self) -> bool {
        let now = Instant::now();
        let is_double = matches!(self.last_esc, Some(prev) if now.duration_since(prev) < DOUBLE_ESC_WINDOW);
        self.last_esc = if is_double { None } else { Some(now) };
        is_double
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn first_press_is_never_a_double() {
        let mut tracker = EscapeTracker::new();
        assert!(!tracker.record());
    }

    #[test]
    fn second_press_within_window_is_a_double() {
        let mut tracker = EscapeTracker::new();
        assert!(!tracker.record());
        assert!(tracker.record());
    }

    #[test]
    fn second_press_after_window_is_not_a_double() {
        let mut tracker = EscapeTracker::new();
        assert!(!tracker.record());
        sleep(DOUBLE_ESC_WINDOW + Duration::from_millis(50));
        assert!(!tracker.record());
    }
}
