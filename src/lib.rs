// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! # idwallet
//! Wallet service for identity registration on Verus-style chains. Talks to a
//! wallet daemon over JSON-RPC and serves a local invoke bridge to the desktop UI.
//!
//! ## Features
//! * **Confirmation tracking**: operations that need the chain to catch up, such as
//!   name commitments, identity registrations and currency conversions, are submitted
//!   once and then polled until they are ready, time out or get cancelled. Every
//!   attempt is guarded against stale results, and only one tracker can watch a given
//!   address or identity at a time.
//! * **Wallet commands**: typed wrappers over balance, identity and namespace queries.
//! * **Invoke bridge**: a tarpc service reachable over authenticated HTTP on localhost.
//!   Long running operations become sessions the UI polls by id.
//!
//! ## Configuration
//! Settings are read from `config.toml` in the user config directory and can be
//! overridden with `IDWALLET_<SECTION>_<FIELD>` environment variables, for example
//! `IDWALLET_TRACKER_POLLINTERVALSECS=5`.

pub mod backend;
pub mod global;
pub mod operations;
pub mod prefs;
pub mod settings;
pub mod tracker;
pub mod wallet;

#[cfg(feature = "bridge")]
pub mod bridge;
