/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use error_support::{ErrorHandling, GetErrorHandling};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncEngineError {
    #[error("local store error: {0}")]
    Local(#[from] local_store::LocalStoreError),

    #[error("remote store error: {0}")]
    Remote(#[from] remote_store::RemoteStoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncEngineError>;

/// `SyncEngineError` wraps `serde_json::Error`, which isn't `Clone`, so
/// unlike the other crates' error types the external error here is the
/// rendered message rather than `Self`.
impl GetErrorHandling for SyncEngineError {
    type ExternalError = String;

    fn get_error_handling(&self) -> ErrorHandling<Self::ExternalError> {
        match self {
            Self::Local(_) | Self::Remote(_) => {
                ErrorHandling::report(self.to_string(), log::Level::Warn, "sync-engine".to_string())
            }
            Self::Json(_) => ErrorHandling::unexpected(self.to_string(), Some("sync-engine")),
        }
    }
}
