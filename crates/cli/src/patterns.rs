/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use pattern_planner::{Pattern, PatternStep, Planner, StepCommand};

/// A small built-in set of diagnostic patterns: questions that are better
/// answered by actually running a probe command than by guessing from
/// training data alone. Real deployments would load these from a config
/// file; this binary ships a fixed starter set so `chat` has something to
/// demonstrate the pattern-planner/shell-runner wiring end to end.
pub fn builtin_planner() -> Planner {
    let mut planner = Planner::new();
    planner.register(disk_usage_pattern());
    planner.register(memory_usage_pattern());
    planner
}

fn disk_usage_pattern() -> Pattern {
    Pattern::new(
        "disk-usage",
        regex::Regex::new("(?i)disk (space|usage)").unwrap(),
        vec![PatternStep::new("df", StepCommand::Static("df -h".to_string())).extract_as("df")],
    )
}

fn memory_usage_pattern() -> Pattern {
    Pattern::new(
        "memory-usage",
        regex::Regex::new("(?i)memory (usage|free)").unwrap(),
        vec![PatternStep::new("free", StepCommand::Static("free -h".to_string())).extract_as("free")],
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn disk_question_matches_disk_pattern() {
        let planner = builtin_planner();
        let plan = planner.match_question("how much disk space is left?").unwrap();
        assert_eq!(plan.pattern_name, "disk-usage");
    }

    #[test]
    fn unrelated_question_matches_nothing() {
        let planner = builtin_planner();
        assert!(planner.match_question("what's the weather like").is_none());
    }
}
