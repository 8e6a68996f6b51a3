/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use error_support::{ErrorHandling, GetErrorHandling};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LocalStoreError {
    #[error("command must not be empty")]
    BadInput,

    #[error("SQL error: {0}")]
    Sql(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serde(String),
}

pub type Result<T> = std::result::Result<T, LocalStoreError>;

impl From<rusqlite::Error> for LocalStoreError {
    fn from(e: rusqlite::Error) -> Self {
        LocalStoreError::Sql(e.to_string())
    }
}

impl From<sql_support::open_database::Error> for LocalStoreError {
    fn from(e: sql_support::open_database::Error) -> Self {
        LocalStoreError::Migration(e.to_string())
    }
}

impl From<serde_json::Error> for LocalStoreError {
    fn from(e: serde_json::Error) -> Self {
        LocalStoreError::Serde(e.to_string())
    }
}

impl GetErrorHandling for LocalStoreError {
    type ExternalError = LocalStoreError;

    fn get_error_handling(&self) -> ErrorHandling<Self::ExternalError> {
        match self {
            // Surfaced to the UI per the taxonomy table; not a bug.
            Self::BadInput => ErrorHandling::log(self.clone(), log::Level::Warn),
            Self::Sql(_) => ErrorHandling::report(
                self.clone(),
                log::Level::Error,
                "local-store-sql".to_string(),
            ),
            Self::Migration(_) | Self::Serde(_) => {
                ErrorHandling::unexpected(self.clone(), Some("local-store"))
            }
        }
    }
}
