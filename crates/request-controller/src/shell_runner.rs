/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use async_trait::async_trait;
use std::time::Duration;

/// Out-of-scope external capability, on the same footing as [`crate::AiProvider`]:
/// spec §1 lists `Shell.Run(cmd, timeout) -> stdout` as a collaborator this
/// system calls but does not implement. Consulted by
/// [`crate::RequestController::ask`] to execute a matched pattern's probe
/// steps before the AI call.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String, String>;
}
