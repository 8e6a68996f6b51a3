/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::context::Context;
use crate::error::{PatternError, Result};
use crate::pattern::{Pattern, PatternStep};
use serde_json::Value;
use std::collections::HashSet;

/// A pattern bound to a specific match, tracking which steps have run and
/// the context accumulated so far.
pub struct Plan {
    pub pattern_name: String,
    steps: Vec<PatternStep>,
    executed: HashSet<String>,
    pub context: Context,
    aggregator: Option<fn(&Context) -> Value>,
}

impl Plan {
    pub(crate) fn from_pattern(pattern: &Pattern) -> Self {
        Self {
            pattern_name: pattern.name.clone(),
            steps: pattern.sequence.clone(),
            executed: HashSet::new(),
            context: Context::new(),
            aggregator: pattern.aggregator,
        }
    }

    /// The step `next_commands` would resolve next, without resolving or
    /// mutating anything. Lets a caller that just ran `next_commands`'s
    /// output know which step's id to pass back to `update_context`.
    pub fn current_step_id(&self) -> Option<String> {
        self.steps.iter().find(|s| !self.executed.contains(&s.id)).map(|s| s.id.clone())
    }

    /// Commands for the next unexecuted step, honoring dynamic steps. A
    /// dynamic step that resolves to no commands counts as executed
    /// immediately, and the search moves on to the following step.
    pub fn next_commands(&mut self) -> Vec<String> {
        loop {
            let next = self.steps.iter().find(|s| !self.executed.contains(&s.id)).cloned();
            let Some(step) = next else {
                return Vec::new();
            };
            let commands = step.command.resolve(&self.context);
            if commands.is_empty() {
                self.executed.insert(step.id.clone());
                continue;
            }
            return commands;
        }
    }

    /// Marks `step_id` executed, parsing `output` (via the step's
    /// `parse_output` function, or storing it as a raw string) into the
    /// context under the step's `extract` key.
    pub fn update_context(&mut self, step_id: &str, output: &str) -> Result<()> {
        let step = self
            .steps
            .iter()
            .find(|s| s.id == step_id)
            .ok_or_else(|| PatternError::UnknownStep(step_id.to_string()))?;
        let value = match step.parse_output {
            Some(parser) => parser(output),
            None => Value::String(output.to_string()),
        };
        if let Some(key) = step.extract.clone() {
            if step.aggregate {
                self.context.push(&key, value);
            } else {
                self.context.set(&key, value);
            }
        }
        self.executed.insert(step_id.to_string());
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .filter(|s| !s.optional)
            .all(|s| self.executed.contains(&s.id))
    }

    pub fn aggregate(&self) -> Option<Value> {
        self.aggregator.map(|f| f(&self.context))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pattern::StepCommand;

    fn sample_pattern() -> Pattern {
        Pattern::new(
            "disk-usage",
            regex::Regex::new("disk space").unwrap(),
            vec![
                PatternStep::new("df", StepCommand::Static("df -h".to_string())).extract_as("df"),
                PatternStep::new("du", StepCommand::Static("du -sh /var/log".to_string()))
                    .extract_as("du")
                    .optional(),
            ],
        )
    }

    #[test]
    fn next_commands_returns_the_first_unexecuted_step() {
        let pattern = sample_pattern();
        let mut plan = Plan::from_pattern(&pattern);
        assert_eq!(plan.next_commands(), vec!["df -h".to_string()]);
    }

    #[test]
    fn is_complete_ignores_optional_steps() {
        let pattern = sample_pattern();
        let mut plan = Plan::from_pattern(&pattern);
        assert!(!plan.is_complete());
        plan.update_context("df", "Filesystem  Used").unwrap();
        assert!(plan.is_complete());
    }

    #[test]
    fn dynamic_step_with_no_commands_is_skipped() {
        fn no_targets(_: &Context) -> Vec<String> {
            Vec::new()
        }
        let pattern = Pattern::new(
            "empty-dynamic",
            regex::Regex::new("probe").unwrap(),
            vec![
                PatternStep::new("scan", StepCommand::Dynamic(no_targets)),
                PatternStep::new("report", StepCommand::Static("echo done".to_string())),
            ],
        );
        let mut plan = Plan::from_pattern(&pattern);
        assert_eq!(plan.next_commands(), vec!["echo done".to_string()]);
    }

    #[test]
    fn update_context_rejects_unknown_step() {
        let pattern = sample_pattern();
        let mut plan = Plan::from_pattern(&pattern);
        assert!(matches!(
            plan.update_context("missing", "x"),
            Err(PatternError::UnknownStep(s)) if s == "missing"
        ));
    }
}
