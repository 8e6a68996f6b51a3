/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Stable machine fingerprint generation and user lookup.
//!
//! `machine_id()` generates and caches a per-host fingerprint; `MachineInfo`
//! bundles the other facts (hostname, outbound ip, os/arch) recorded on
//! first use. Storage is left to `local-store`/`remote-store`, which
//! implement the narrow [`MachineStore`]/[`UserStore`] traits this crate
//! defines so it never needs to depend on them.

mod error;
mod fingerprint;
mod model;
mod traits;

pub use error::IdentityError;
pub use fingerprint::machine_id;
pub use model::{Machine, MachineInfo, User};
pub use traits::{register_machine, resolve_user, MachineStore, UserStore};

/// Best-effort outbound IP, determined without sending any packets: connect
/// a UDP socket to a well-known address and read back the local endpoint the
/// kernel would use for that route.
pub fn outbound_ip() -> Option<String> {
    use std::net::UdpSocket;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}
