/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("failed to read or write the machine-id cache file: {0}")]
    CacheIo(#[from] std::io::Error),
}
