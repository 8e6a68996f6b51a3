/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

mod config;
mod db;
mod error;
mod model;
mod scope;

pub use config::RemoteConfig;
pub use db::{RemoteStore, RemoteStoreHandle};
#[cfg(any(test, feature = "test-utils"))]
pub use db::test_utils;
pub use error::{RemoteStoreError, Result};
pub use model::{NewRemoteCommand, StatusUpdateExtras, UserStats};
pub use scope::{Scope, HYBRID_WINDOW_DAYS, REQUIRED_TABLES};
