/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Stable machine fingerprint generation.
//!
//! Generation order mirrors the teacher's layered fallback style (see
//! `open_database::open_database_with_flags`'s retry-then-recreate shape):
//! each probe either returns an id or falls through to the next one. Probes
//! run once; the result is cached to disk.

use crate::error::IdentityError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Reads the cached fingerprint from `cache_path`, generating and caching a
/// fresh one if the file doesn't exist yet.
pub fn machine_id(cache_path: &Path) -> Result<String, IdentityError> {
    if let Some(cached) = read_cache(cache_path)? {
        return Ok(cached);
    }
    let id = generate_machine_id();
    write_cache(cache_path, &id)?;
    Ok(id)
}

fn read_cache(cache_path: &Path) -> Result<Option<String>, IdentityError> {
    match fs::read_to_string(cache_path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_cache(cache_path: &Path, id: &str) -> Result<(), IdentityError> {
    if let Some(parent) = cache_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(cache_path, id)?;
    set_owner_only(cache_path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<(), IdentityError> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<(), IdentityError> {
    Ok(())
}

/// Combines `hostname | primary_mac | system_uuid | os-arch` under SHA-256
/// and returns the hex digest.
fn generate_machine_id() -> String {
    let seed = system_id_seed();
    let hostname = hostname();
    let mac = primary_mac().unwrap_or_else(|| "unknown-mac".to_string());
    let os_arch = format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH);

    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(b"|");
    hasher.update(mac.as_bytes());
    hasher.update(b"|");
    hasher.update(seed.as_bytes());
    hasher.update(b"|");
    hasher.update(os_arch.as_bytes());
    hex::encode(hasher.finalize())
}

/// The "system uuid" half of the fingerprint. Tries, in order: systemd's
/// `/etc/machine-id`, a dbus-assigned machine id, a platform UUID file, and
/// finally a timestamp+random fallback that's at least stable per-process.
fn system_id_seed() -> String {
    let probes: [fn() -> Option<String>; 3] = [
        systemd_machine_id,
        dbus_machine_id,
        platform_uuid,
    ];
    for probe in probes {
        if let Some(id) = probe() {
            return id;
        }
    }
    timestamp_random_fallback()
}

fn systemd_machine_id() -> Option<String> {
    read_trimmed("/etc/machine-id")
}

fn dbus_machine_id() -> Option<String> {
    read_trimmed("/var/lib/dbus/machine-id")
}

fn platform_uuid() -> Option<String> {
    read_trimmed("/sys/class/dmi/id/product_uuid")
}

fn read_trimmed(path: &str) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn timestamp_random_fallback() -> String {
    use rand::Rng;
    let now = chrono::Utc::now().timestamp_millis();
    let rand_part: u32 = rand::thread_rng().gen();
    format!("fallback-{now}-{rand_part:08x}")
}

/// Best-effort hostname lookup. Falls back to `/etc/hostname`, then the
/// `HOSTNAME` env var, then a literal `"unknown-host"`.
pub fn hostname() -> String {
    if let Some(h) = read_trimmed("/proc/sys/kernel/hostname") {
        return h;
    }
    if let Some(h) = read_trimmed("/etc/hostname") {
        return h;
    }
    if let Ok(h) = std::env::var("HOSTNAME") {
        if !h.is_empty() {
            return h;
        }
    }
    "unknown-host".to_string()
}

/// Best-effort primary (non-loopback) MAC address, read from
/// `/sys/class/net/*/address` on Linux.
fn primary_mac() -> Option<String> {
    let entries = fs::read_dir("/sys/class/net").ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "lo" {
            continue;
        }
        let addr_path: PathBuf = entry.path().join("address");
        if let Some(mac) = read_trimmed(addr_path.to_str()?) {
            if mac != "00:00:00:00:00:00" {
                return Some(mac);
            }
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn caches_generated_id_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("machine-id");

        let first = machine_id(&cache_path).unwrap();
        assert!(cache_path.exists());
        let second = machine_id(&cache_path).unwrap();
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn cache_file_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("machine-id");
        machine_id(&cache_path).unwrap();

        let mode = fs::metadata(&cache_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn generated_id_is_deterministic_within_a_run() {
        assert_eq!(generate_machine_id(), generate_machine_id());
    }
}
