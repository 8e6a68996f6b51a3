/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use remote_store::RemoteConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `<home>/.mcp-terminal/turso-config.json`, per spec §6. Every field is
/// optional: the file may not exist yet (first run), and any of
/// `REMOTE_DB_URL`/`REMOTE_DB_TOKEN`/`REMOTE_DB_SYNC_URL` overrides the
/// matching field when set, env taking precedence over the file the way
/// the teacher's `cli-support` credential loading prefers explicit
/// overrides over a cached file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub url: Option<String>,
    pub token: Option<String>,
    pub sync_url: Option<String>,
    pub sync_interval: Option<u64>,
    pub history_mode: Option<String>,
    pub machine_id: Option<String>,
    pub is_admin_config: Option<bool>,
    pub created_at: Option<i64>,
}

impl Config {
    /// Reads `path` if it exists (a missing file is not an error - every
    /// field just stays `None`), then applies env var overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("REMOTE_DB_URL") {
            if !url.is_empty() {
                self.url = Some(url);
            }
        }
        if let Ok(token) = std::env::var("REMOTE_DB_TOKEN") {
            if !token.is_empty() {
                self.token = Some(token);
            }
        }
        if let Ok(sync_url) = std::env::var("REMOTE_DB_SYNC_URL") {
            if !sync_url.is_empty() {
                self.sync_url = Some(sync_url);
            }
        }
    }

    /// `None` when no remote URL is configured anywhere (file or env) -
    /// the caller treats that as fatal-init, per spec §6/§7.
    pub fn remote_config(&self) -> Option<RemoteConfig> {
        let url = self.url.clone()?;
        Some(RemoteConfig {
            url,
            token: self.token.clone(),
            sync_url: self.sync_url.clone(),
        })
    }
}

/// `USER_OVERRIDE` env var, read separately from the rest of `Config`
/// since it names a session actor rather than a store setting.
pub fn user_override() -> Option<String> {
    std::env::var("USER_OVERRIDE").ok().filter(|s| !s.is_empty())
}

/// `DEBUG=1` is equivalent to `-v`/`--debug` (spec §6 env vars, SPEC_FULL
/// ambient-stack logging note).
pub fn debug_env_set() -> bool {
    matches!(std::env::var("DEBUG").as_deref(), Ok("1"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("turso-config.json")).unwrap();
        assert!(config.url.is_none());
    }

    #[test]
    fn file_contents_are_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turso-config.json");
        std::fs::write(&path, r#"{"url": "file:///tmp/x.db", "sync_interval": 60}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.url.as_deref(), Some("file:///tmp/x.db"));
        assert_eq!(config.sync_interval, Some(60));
    }

    #[test]
    fn env_var_overrides_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turso-config.json");
        std::fs::write(&path, r#"{"url": "file:///tmp/x.db"}"#).unwrap();
        // SAFETY: test-only, no other thread in this process reads this var concurrently.
        unsafe { std::env::set_var("REMOTE_DB_URL", "libsql://override") };
        let config = Config::load(&path).unwrap();
        unsafe { std::env::remove_var("REMOTE_DB_URL") };
        assert_eq!(config.url.as_deref(), Some("libsql://override"));
    }

    #[test]
    fn no_url_anywhere_yields_no_remote_config() {
        assert!(Config::default().remote_config().is_none());
    }
}
