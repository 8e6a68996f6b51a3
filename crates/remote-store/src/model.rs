/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/// Per-request metadata carried on a `SaveGlobal/User/Machine` write.
#[derive(Debug, Clone, Default)]
pub struct NewRemoteCommand {
    pub request_id: Option<String>,
    pub user_id: Option<i64>,
    pub machine_id: Option<String>,
    pub session_id: Option<String>,
}

/// Optional overrides honored by `UpdateStatusByRequestID`.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdateExtras {
    pub response: Option<String>,
}

/// Returned by `RemoteStore::user_stats` for the `user stats` CLI
/// subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserStats {
    pub total_commands: i64,
    pub last_activity: Option<i64>,
}
