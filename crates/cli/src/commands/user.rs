/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use anyhow::Result;
use remote_store::RemoteStore;

pub enum UserArgs {
    Create { username: String, name: Option<String>, email: Option<String> },
    List,
    Stats { username: String },
    Delete { username: String },
    Reactivate { username: String },
}

pub async fn run(remote: &RemoteStore, args: UserArgs) -> Result<()> {
    match args {
        UserArgs::Create { username, name, email } => {
            let user = remote.create_user(&username, name.as_deref(), email.as_deref()).await?;
            println!("created user {} (id {})", user.username, user.id);
        }
        UserArgs::List => {
            let users = remote.list_users().await?;
            if users.is_empty() {
                println!("(no users)");
            }
            for user in users {
                println!(
                    "{:>6}  {:<20} {}",
                    user.id,
                    user.username,
                    if user.active { "active" } else { "inactive" }
                );
            }
        }
        UserArgs::Stats { username } => {
            let user = remote
                .find_user_by_username(&username)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown user: {username}"))?;
            let stats = remote.user_stats(user.id).await?;
            println!("user:           {}", user.username);
            println!("total commands: {}", stats.total_commands);
            match stats.last_activity {
                Some(ts) => println!("last activity:  {ts}"),
                None => println!("last activity:  (never)"),
            }
        }
        UserArgs::Delete { username } => {
            remote.set_user_active(&username, false).await?;
            println!("deactivated {username}");
        }
        UserArgs::Reactivate { username } => {
            remote.set_user_active(&username, true).await?;
            println!("reactivated {username}");
        }
    }
    Ok(())
}
