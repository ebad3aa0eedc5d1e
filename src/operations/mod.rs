// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Daemon operations that are submitted once and then awaited with a
//! [`Tracker`](crate::tracker::Tracker).

use crate::backend::Backend;
use std::sync::Arc;

mod balance;
mod chain;
mod registration;

pub use balance::*;
pub use chain::*;
pub use registration::*;

/// Backend handle shared between an operation and its caller.
pub type SharedBackend = Arc<dyn Backend>;

/// Resource key of an address.
pub fn address_key(address: &str) -> String {
    format!("address:{address}")
}

/// Resource key of an identity.
pub fn identity_key(identity_name: &str) -> String {
    format!("identity:{identity_name}")
}
