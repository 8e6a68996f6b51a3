/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use anyhow::{Context, Result};
use std::path::PathBuf;

/// `<home>/.mcp-terminal` (spec §6's persisted-files root). Created on
/// first use; every file under it is written owner-read-only.
pub fn base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let dir = home.join(".mcp-terminal");
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir)
}

pub fn cache_db_path(base: &std::path::Path) -> PathBuf {
    base.join("cache.db")
}

pub fn machine_id_path(base: &std::path::Path) -> PathBuf {
    base.join("machine-id")
}

pub fn config_path(base: &std::path::Path) -> PathBuf {
    base.join("turso-config.json")
}
