/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Helpers to keep user questions/answers out of logs and breadcrumbs.

/// Replace a free-text string with a length-preserving preview safe to log.
///
/// Keeps the first `keep` characters (for grepability) and replaces the rest
/// with a single summary marker, rather than emitting the full command or AI
/// response (which may contain arbitrary user-entered text) into logs.
pub fn redact_for_log(text: &str, keep: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= keep {
        return text.to_string();
    }
    let head: String = text.chars().take(keep).collect();
    format!("{head}…[{} more chars redacted]", char_count - keep)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(redact_for_log("ls -la", 40), "ls -la");
    }

    #[test]
    fn long_text_is_truncated_with_a_count() {
        let text = "a".repeat(100);
        let redacted = redact_for_log(&text, 10);
        assert_eq!(redacted, format!("{}…[90 more chars redacted]", "a".repeat(10)));
    }
}
