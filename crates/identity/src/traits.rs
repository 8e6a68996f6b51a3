/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::error::IdentityError;
use crate::model::{Machine, MachineInfo, User};

/// Implemented by whichever store owns the `machines` table (`local-store`).
/// Kept as a narrow trait here so `identity` doesn't need to depend on
/// `local-store`/`remote-store` directly.
pub trait MachineStore {
    fn upsert_machine(&self, info: &MachineInfo) -> Result<Machine, IdentityError>;
}

/// Implemented by whichever store owns the `users` table (`remote-store`).
pub trait UserStore {
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, IdentityError>;
}

/// Upserts the Machine row for this host, refreshing `last_seen`,
/// `hostname`, `ip`, `os_info`.
pub fn register_machine<S: MachineStore>(
    store: &S,
    info: &MachineInfo,
) -> Result<Machine, IdentityError> {
    store.upsert_machine(info)
}

/// Resolves a username to its `User` row, failing fatally if it isn't
/// found (per the taxonomy: `UserNotFound` is fatal to session start).
pub fn resolve_user<S: UserStore>(store: &S, username: &str) -> Result<User, IdentityError> {
    store
        .find_user_by_username(username)?
        .ok_or_else(|| IdentityError::UserNotFound(username.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    struct FakeUserStore {
        users: Vec<User>,
    }
    impl UserStore for FakeUserStore {
        fn find_user_by_username(&self, username: &str) -> Result<Option<User>, IdentityError> {
            Ok(self.users.iter().find(|u| u.username == username).cloned())
        }
    }

    #[test]
    fn resolve_user_succeeds_for_known_username() {
        let store = FakeUserStore {
            users: vec![User {
                id: 1,
                username: "alice".into(),
                name: None,
                email: None,
                active: true,
            }],
        };
        let user = resolve_user(&store, "alice").unwrap();
        assert_eq!(user.id, 1);
    }

    #[test]
    fn resolve_user_fails_for_unknown_username() {
        let store = FakeUserStore { users: vec![] };
        assert!(matches!(
            resolve_user(&store, "bob"),
            Err(IdentityError::UserNotFound(u)) if u == "bob"
        ));
    }
}
