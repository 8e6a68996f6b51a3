/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

mod context;
mod error;
mod pattern;
mod plan;
mod planner;

pub use context::Context;
pub use error::{PatternError, Result};
pub use pattern::{Pattern, PatternStep, StepCommand};
pub use plan::Plan;
pub use planner::Planner;
