/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use error_support::{ErrorHandling, GetErrorHandling};
use thiserror::Error;

/// Local writes never fail the UI thread and Remote errors degrade to
/// eventual consistency via the sync queue, so the only way `Ask` itself
/// fails is input validation or a genuinely unexpected local-store fault.
#[derive(Debug, Clone, Error)]
pub enum RequestControllerError {
    #[error("command must not be empty")]
    BadInput,

    #[error("local store error: {0}")]
    Local(String),
}

pub type Result<T> = std::result::Result<T, RequestControllerError>;

impl GetErrorHandling for RequestControllerError {
    type ExternalError = RequestControllerError;

    fn get_error_handling(&self) -> ErrorHandling<Self::ExternalError> {
        match self {
            Self::BadInput => ErrorHandling::log(self.clone(), log::Level::Warn),
            Self::Local(_) => ErrorHandling::report(
                self.clone(),
                log::Level::Error,
                "request-controller-local".to_string(),
            ),
        }
    }
}
