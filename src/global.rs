// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::tracker::ResourceLocks;
use lazy_static::*;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

lazy_static! {
    /// Set by the signal handlers, checked by the main loop.
    pub static ref EXIT_SIGNAL: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

    /// Unix timestamp of process startup.
    static ref STARTUP_TIME: AtomicI64 = AtomicI64::new(0);

    /// Resources currently watched by a tracker, shared by every session.
    pub static ref RESOURCE_LOCKS: ResourceLocks = ResourceLocks::new();
}

/// Initialize globals
pub fn init() {
    STARTUP_TIME.store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
}

pub fn startup_time() -> i64 {
    STARTUP_TIME.load(Ordering::Relaxed)
}

/// Seconds since `init` was called.
pub fn uptime_secs() -> i64 {
    chrono::Utc::now().timestamp() - startup_time()
}

pub fn exit_requested() -> bool {
    EXIT_SIGNAL.load(Ordering::Relaxed)
}
