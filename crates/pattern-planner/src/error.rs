/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern {0:?} is not registered")]
    UnknownPattern(String),

    #[error("invalid regex for pattern {0:?}: {1}")]
    BadMatcher(String, regex::Error),

    #[error("step {0:?} is not part of this plan")]
    UnknownStep(String),
}

pub type Result<T> = std::result::Result<T, PatternError>;
