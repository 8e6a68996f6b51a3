/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::context::Context;
use regex::Regex;
use serde_json::Value;

/// A step's command is either a fixed string or a function of the plan's
/// accumulated context. Tagged variant rather than a boxed closure, per
/// the "keep patterns serializable and testable" design note: function
/// pointers are `Copy`/`Clone` and comparable, closures aren't.
#[derive(Clone)]
pub enum StepCommand {
    Static(String),
    Dynamic(fn(&Context) -> Vec<String>),
}

impl StepCommand {
    pub fn resolve(&self, context: &Context) -> Vec<String> {
        match self {
            StepCommand::Static(cmd) => vec![cmd.clone()],
            StepCommand::Dynamic(f) => f(context),
        }
    }
}

/// One step in a pattern's `sequence`.
#[derive(Clone)]
pub struct PatternStep {
    pub id: String,
    pub command: StepCommand,
    pub parse_output: Option<fn(&str) -> Value>,
    pub extract: Option<String>,
    pub optional: bool,
    pub aggregate: bool,
}

impl PatternStep {
    pub fn new(id: impl Into<String>, command: StepCommand) -> Self {
        Self {
            id: id.into(),
            command,
            parse_output: None,
            extract: None,
            optional: false,
            aggregate: false,
        }
    }

    pub fn extract_as(mut self, key: impl Into<String>) -> Self {
        self.extract = Some(key.into());
        self
    }

    pub fn parsed_with(mut self, parser: fn(&str) -> Value) -> Self {
        self.parse_output = Some(parser);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn aggregated(mut self) -> Self {
        self.aggregate = true;
        self
    }
}

/// A named pattern: a trigger `matcher` plus an ordered `sequence` of
/// probe steps and an optional `aggregator` that folds the finished
/// context into a structured result.
#[derive(Clone)]
pub struct Pattern {
    pub name: String,
    pub matcher: Regex,
    pub sequence: Vec<PatternStep>,
    pub aggregator: Option<fn(&Context) -> Value>,
}

impl Pattern {
    pub fn new(name: impl Into<String>, matcher: Regex, sequence: Vec<PatternStep>) -> Self {
        Self {
            name: name.into(),
            matcher,
            sequence,
            aggregator: None,
        }
    }

    pub fn with_aggregator(mut self, aggregator: fn(&Context) -> Value) -> Self {
        self.aggregator = Some(aggregator);
        self
    }
}
