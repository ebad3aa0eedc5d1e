// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use super::SharedBackend;
use crate::backend::BackendErr;
use crate::tracker::{PollableOperation, ProgressKind};
use crate::wallet;
use async_trait::async_trait;

/// Waits until the chain grew by `blocks` blocks.
pub struct BlockHeightAdvance {
    backend: SharedBackend,
    blocks: u64,
}

impl BlockHeightAdvance {
    pub fn new(backend: SharedBackend, blocks: u64) -> Self {
        Self { backend, blocks }
    }
}

#[async_trait]
impl PollableOperation for BlockHeightAdvance {
    /// Height when the wait started.
    type Receipt = u64;

    /// Height once it was reached.
    type Outcome = u64;

    fn kind(&self) -> ProgressKind {
        ProgressKind::Blocks
    }

    fn label(&self) -> String {
        format!("wait for {} blocks", self.blocks)
    }

    async fn submit(&self) -> Result<u64, BackendErr> {
        wallet::block_height(self.backend.as_ref()).await
    }

    async fn check(&self, base: &u64) -> Result<Option<u64>, BackendErr> {
        let height = wallet::block_height(self.backend.as_ref()).await?;
        Ok((height >= base.saturating_add(self.blocks)).then_some(height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::tracker::{ResourceLocks, Tracker, TrackerConfig};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn it_waits_for_the_chain_to_advance() {
        let backend = Arc::new(MockBackend::new());
        backend
            .respond("getblockcount", Ok(json!(100)))
            .respond("getblockcount", Ok(json!(100)))
            .respond("getblockcount", Ok(json!(101)))
            .respond_always("getblockcount", Ok(json!(103)));

        let tracker = Tracker::with_locks(
            BlockHeightAdvance::new(backend.clone(), 2),
            TrackerConfig::bounded(Duration::from_secs(10), Duration::from_secs(600)),
            ResourceLocks::new(),
        );

        tracker.start().unwrap();
        assert_eq!(tracker.wait().await, Ok(103));
        assert_eq!(tracker.status().receipt, Some(100));
        assert_eq!(backend.calls("getblockcount"), 4);
    }
}
