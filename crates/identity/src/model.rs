/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use serde::{Deserialize, Serialize};

/// `{id, username (unique), name, email, active}`. Username is the sole
/// external key; mutated only by admin operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub active: bool,
}

/// `{machine_id, hostname, ip, os_info, first_seen, last_seen, total_commands}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub machine_id: String,
    pub hostname: String,
    pub ip: Option<String>,
    pub os_info: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub total_commands: i64,
}

/// Freshly sampled facts about the local machine, used to register or
/// refresh a `Machine` row.
#[derive(Debug, Clone)]
pub struct MachineInfo {
    pub machine_id: String,
    pub hostname: String,
    pub ip: Option<String>,
    pub os_info: String,
}

impl MachineInfo {
    pub fn gather(machine_id: String) -> Self {
        Self {
            machine_id,
            hostname: crate::fingerprint::hostname(),
            ip: crate::outbound_ip(),
            os_info: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}
