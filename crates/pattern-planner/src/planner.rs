/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::pattern::Pattern;
use crate::plan::Plan;

/// Holds registered patterns in registration order; `Match` is first-match-wins.
#[derive(Default)]
pub struct Planner {
    patterns: Vec<Pattern>,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    pub fn match_question(&self, question: &str) -> Option<Plan> {
        self.patterns
            .iter()
            .find(|pattern| pattern.matcher.is_match(question))
            .map(Plan::from_pattern)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pattern::{PatternStep, StepCommand};

    fn make(name: &str, regex: &str) -> Pattern {
        Pattern::new(
            name,
            regex::Regex::new(regex).unwrap(),
            vec![PatternStep::new("s1", StepCommand::Static("echo hi".into()))],
        )
    }

    #[test]
    fn first_registered_match_wins() {
        let mut planner = Planner::new();
        planner.register(make("generic", "disk"));
        planner.register(make("specific", "disk space"));
        let plan = planner.match_question("how much disk space do I have").unwrap();
        assert_eq!(plan.pattern_name, "generic");
    }

    #[test]
    fn no_match_returns_none() {
        let mut planner = Planner::new();
        planner.register(make("generic", "disk"));
        assert!(planner.match_question("what time is it").is_none());
    }
}
