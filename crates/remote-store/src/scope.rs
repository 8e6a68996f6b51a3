/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/// `global`, `user`, `machine`, `hybrid` — which Remote tables a write
/// targets, or which tables a read unions over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    User,
    Machine,
    Hybrid,
}

impl Scope {
    pub(crate) fn table_name(self) -> &'static str {
        match self {
            Scope::Global => "history_global",
            Scope::User => "history_user",
            Scope::Machine => "history_machine",
            Scope::Hybrid => unreachable!("hybrid has no single backing table"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = crate::error::RemoteStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Scope::Global),
            "user" => Ok(Scope::User),
            "machine" => Ok(Scope::Machine),
            "hybrid" => Ok(Scope::Hybrid),
            other => Err(crate::error::RemoteStoreError::UnknownScope(
                other.to_string(),
            )),
        }
    }
}

/// The window hybrid reads union over, per spec §4.6/§GLOSSARY.
pub const HYBRID_WINDOW_DAYS: i64 = 7;

/// Required remote tables (spec §6's "Remote schema (authoritative)").
pub const REQUIRED_TABLES: &[&str] = &[
    "users",
    "machines",
    "history_global",
    "history_user",
    "history_machine",
    "command_cache",
    "sessions",
];
