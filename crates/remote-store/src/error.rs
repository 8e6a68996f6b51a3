/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use error_support::{ErrorHandling, GetErrorHandling};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RemoteStoreError {
    /// The configured Remote database is missing one or more of the
    /// tables in the authoritative schema. Fatal; the caller must not
    /// proceed (see spec §4.3/§7).
    #[error("remote schema is missing required tables: {0:?}")]
    SchemaMissing(Vec<String>),

    #[error("network error talking to the remote store: {0}")]
    Network(String),

    #[error("libsql error: {0}")]
    Sql(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("unknown scope: {0}")]
    UnknownScope(String),
}

pub type Result<T> = std::result::Result<T, RemoteStoreError>;

impl From<libsql::Error> for RemoteStoreError {
    fn from(e: libsql::Error) -> Self {
        RemoteStoreError::Sql(e.to_string())
    }
}

impl From<serde_json::Error> for RemoteStoreError {
    fn from(e: serde_json::Error) -> Self {
        RemoteStoreError::Serde(e.to_string())
    }
}

impl GetErrorHandling for RemoteStoreError {
    type ExternalError = RemoteStoreError;

    fn get_error_handling(&self) -> ErrorHandling<Self::ExternalError> {
        match self {
            Self::SchemaMissing(_) => {
                ErrorHandling::unexpected(self.clone(), Some("remote-store-schema"))
            }
            // Network errors are expected under intermittent connectivity;
            // callers fall back to local-only writes, so just log.
            Self::Network(_) => ErrorHandling::log(self.clone(), log::Level::Warn),
            Self::Sql(_) | Self::Serde(_) | Self::UnknownScope(_) => {
                ErrorHandling::report(self.clone(), log::Level::Error, "remote-store".to_string())
            }
        }
    }
}
