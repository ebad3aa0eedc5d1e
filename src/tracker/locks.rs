// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use super::TrackerErr;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::*;
use std::fmt;
use triomphe::Arc;

/// Registry of backend resources currently watched by a tracker. Two
/// trackers on the same address or identity would both emit a completion
/// for the same event, so the second one is refused.
#[derive(Clone, Default)]
pub struct ResourceLocks {
    held: Arc<DashMap<String, ()>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> Self {
        crate::global::RESOURCE_LOCKS.clone()
    }

    pub fn claim(&self, key: &str) -> Result<ResourceClaim, TrackerErr> {
        match self.held.entry(key.to_owned()) {
            Entry::Occupied(_) => {
                debug!("Resource {key} is already being tracked");
                Err(TrackerErr::ResourceBusy(key.to_owned()))
            }
            Entry::Vacant(entry) => {
                entry.insert(());
                Ok(ResourceClaim {
                    key: key.to_owned(),
                    held: self.held.clone(),
                })
            }
        }
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }
}

/// Exclusive claim on a resource key, released on drop.
pub struct ResourceClaim {
    key: String,
    held: Arc<DashMap<String, ()>>,
}

impl ResourceClaim {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ResourceClaim {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}

impl fmt::Debug for ResourceClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClaim")
            .field("key", &self.key)
            .finish()
    }
}
