/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use anyhow::Result;
use identity::{register_machine, MachineInfo};
use local_store::LocalStore;

/// `upsert_machine` both refreshes and returns the row, so `machine info`
/// is a plain re-register: the freshest facts are exactly what a "dump
/// the Machine record" command should show anyway.
pub fn run(local: &LocalStore, machine_id: &str) -> Result<()> {
    let info = MachineInfo::gather(machine_id.to_string());
    let machine = register_machine(local, &info)?;
    println!("machine_id:     {}", machine.machine_id);
    println!("hostname:       {}", machine.hostname);
    println!("ip:             {}", machine.ip.as_deref().unwrap_or("(unknown)"));
    println!("os_info:        {}", machine.os_info);
    println!("first_seen:     {}", machine.first_seen);
    println!("last_seen:      {}", machine.last_seen);
    println!("total_commands: {}", machine.total_commands);
    Ok(())
}
