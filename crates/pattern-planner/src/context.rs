/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use serde_json::Value;
use std::collections::HashMap;

/// Accumulated step output, keyed by each step's `extract` name. A step
/// with `aggregate = true` pushes onto a list instead of overwriting the
/// prior value, so e.g. a dynamic step run across several targets can
/// collect one entry per target.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: HashMap<String, Slot>,
}

#[derive(Debug, Clone)]
enum Slot {
    Single(Value),
    Aggregated(Vec<Value>),
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), Slot::Single(value));
    }

    pub fn push(&mut self, key: &str, value: Value) {
        match self.values.entry(key.to_string()).or_insert_with(|| Slot::Aggregated(Vec::new())) {
            Slot::Aggregated(items) => items.push(value),
            Slot::Single(existing) => {
                let existing = existing.clone();
                self.values.insert(key.to_string(), Slot::Aggregated(vec![existing, value]));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.values.get(key)? {
            Slot::Single(v) => Some(v),
            Slot::Aggregated(items) => items.last(),
        }
    }

    pub fn get_all(&self, key: &str) -> Vec<&Value> {
        match self.values.get(key) {
            Some(Slot::Single(v)) => vec![v],
            Some(Slot::Aggregated(items)) => items.iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn as_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, slot) in &self.values {
            let value = match slot {
                Slot::Single(v) => v.clone(),
                Slot::Aggregated(items) => Value::Array(items.clone()),
            };
            map.insert(key.clone(), value);
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_promotes_single_value_to_a_list() {
        let mut ctx = Context::new();
        ctx.set("hosts", Value::String("a".into()));
        ctx.push("hosts", Value::String("b".into()));
        assert_eq!(ctx.get_all("hosts").len(), 2);
    }

    #[test]
    fn get_returns_the_latest_value() {
        let mut ctx = Context::new();
        ctx.push("x", Value::from(1));
        ctx.push("x", Value::from(2));
        assert_eq!(ctx.get("x"), Some(&Value::from(2)));
    }
}
