/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use anyhow::{Context, Result};
use history_view::HistoryView;
use local_store::{HistoryEntry, HistoryFilter};
use remote_store::Scope;
use std::str::FromStr;

pub struct HistoryArgs {
    pub limit: i64,
    pub search: Option<String>,
    pub scope: String,
    pub user_id: Option<i64>,
    pub machine_id: Option<String>,
}

pub async fn run(view: &HistoryView, args: HistoryArgs) -> Result<()> {
    let scope = Scope::from_str(&args.scope).context("invalid --scope")?;
    let filter = HistoryFilter {
        user_id: args.user_id,
        machine_id: args.machine_id,
    };

    let entries = match &args.search {
        Some(query) => view.search(scope, query, &filter, args.limit).await?,
        None => view.get(scope, &filter, args.limit, 0).await?,
    };

    if entries.is_empty() {
        println!("(no history)");
        return Ok(());
    }
    for entry in &entries {
        print_entry(entry);
    }
    Ok(())
}

fn print_entry(entry: &HistoryEntry) {
    println!(
        "[{}] {} ({})",
        entry.id,
        entry.command,
        entry.status.as_str()
    );
    if let Some(response) = &entry.response {
        println!("    -> {response}");
    }
}
