// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use super::BridgeErr;
use crate::tracker::{PollableOperation, Tracker, TrackerErr, TrackerStatus};
use dashmap::DashMap;
use log::*;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Type-erased tracker as seen by the UI.
pub trait Session: Send + Sync {
    fn label(&self) -> String;

    /// Status with receipt and outcome encoded as JSON.
    fn status(&self) -> TrackerStatus<Value, Value>;

    fn start(&self) -> Result<(), TrackerErr>;

    fn cancel(&self);
}

impl<O> Session for Tracker<O>
where
    O: PollableOperation,
    O::Receipt: Serialize,
    O::Outcome: Serialize,
{
    fn label(&self) -> String {
        self.operation().label()
    }

    fn status(&self) -> TrackerStatus<Value, Value> {
        let status = Tracker::status(self);
        TrackerStatus {
            kind: status.kind,
            phase: status.phase,
            elapsed_ms: status.elapsed_ms,
            elapsed_text: status.elapsed_text,
            polls: status.polls,
            transient_errors: status.transient_errors,
            last_transient_error: status.last_transient_error,
            message: status.message,
            receipt: status.receipt.and_then(|r| serde_json::to_value(r).ok()),
            outcome: status.outcome.and_then(|o| serde_json::to_value(o).ok()),
            error: status.error,
        }
    }

    fn start(&self) -> Result<(), TrackerErr> {
        Tracker::start(self)
    }

    fn cancel(&self) {
        Tracker::cancel(self)
    }
}

/// Live tracker sessions keyed by id. Removing a session tears its
/// tracker down.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<u64, Entry>,
    last_id: AtomicU64,
}

struct Entry {
    session: Arc<dyn Session>,
    touched: Instant,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session` and returns its id. Ids start at 1 and are never
    /// reused.
    pub fn insert(&self, session: Arc<dyn Session>) -> u64 {
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.sessions.insert(
            id,
            Entry {
                session,
                touched: Instant::now(),
            },
        );
        id
    }

    /// Looks a session up and marks it as recently used.
    pub fn get(&self, id: u64) -> Result<Arc<dyn Session>, BridgeErr> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or(BridgeErr::UnknownSession(id))?;
        entry.touched = Instant::now();
        Ok(entry.session.clone())
    }

    pub fn remove(&self, id: u64) -> Option<Arc<dyn Session>> {
        self.sessions.remove(&id).map(|(_, entry)| entry.session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cancels and forgets every session nobody has looked at for `idle`.
    /// Returns how many were dropped.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let is_idle = |entry: &Entry| now.saturating_duration_since(entry.touched) >= idle;
        let ids: Vec<u64> = self
            .sessions
            .iter()
            .filter(|entry| is_idle(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in ids {
            // Skip sessions read since the scan
            if let Some((_, entry)) = self.sessions.remove_if(&id, |_, entry| is_idle(entry)) {
                info!("Session {id}: dropping idle {}", entry.session.label());
                entry.session.cancel();
                evicted += 1;
            }
        }

        evicted
    }

    /// Cancels and forgets every session.
    pub fn clear(&self) {
        let ids: Vec<u64> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some(session) = self.remove(id) {
                debug!("Session {id}: closing {}", session.label());
                session.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::operations::BlockHeightAdvance;
    use crate::tracker::{Phase, ResourceLocks, TrackerConfig};
    use serde_json::json;

    fn block_wait(backend: Arc<MockBackend>, blocks: u64) -> Arc<dyn Session> {
        Arc::new(Tracker::with_locks(
            BlockHeightAdvance::new(backend, blocks),
            TrackerConfig::bounded(Duration::from_secs(10), Duration::from_secs(60)),
            ResourceLocks::new(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn it_encodes_receipts_and_outcomes() {
        let backend = Arc::new(MockBackend::new());
        backend
            .respond("getblockcount", Ok(json!(7)))
            .respond_always("getblockcount", Ok(json!(8)));

        let session = block_wait(backend, 1);
        assert_eq!(session.status().phase, Phase::Idle);
        session.start().unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let status = session.status();
        assert_eq!(status.phase, Phase::Succeeded);
        assert_eq!(status.receipt, Some(json!(7)));
        assert_eq!(status.outcome, Some(json!(8)));
        assert_eq!(session.label(), "wait for 1 blocks");
    }

    #[tokio::test]
    async fn ids_are_not_reused() {
        let backend = Arc::new(MockBackend::new());
        let registry = SessionRegistry::new();

        let first = registry.insert(block_wait(backend.clone(), 1));
        let second = registry.insert(block_wait(backend.clone(), 1));
        assert_eq!((first, second), (1, 2));

        assert!(registry.remove(first).is_some());
        assert!(registry.remove(first).is_none());
        assert_eq!(registry.insert(block_wait(backend, 1)), 3);
        assert_eq!(registry.len(), 2);

        match registry.get(first) {
            Err(BridgeErr::UnknownSession(1)) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("session 1 should be gone"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_cancels_running_sessions() {
        let backend = Arc::new(MockBackend::new());
        backend.respond_always("getblockcount", Ok(json!(1)));

        let registry = SessionRegistry::new();
        let session = block_wait(backend.clone(), 100);
        session.start().unwrap();
        registry.insert(session.clone());

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(session.status().phase, Phase::Waiting);

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(session.status().phase, Phase::Idle);

        let calls = backend.calls("getblockcount");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.calls("getblockcount"), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn it_drops_sessions_nobody_reads() {
        let backend = Arc::new(MockBackend::new());
        backend.respond_always("getblockcount", Ok(json!(1)));

        let registry = SessionRegistry::new();
        let abandoned = block_wait(backend.clone(), 100);
        let watched = block_wait(backend.clone(), 100);
        abandoned.start().unwrap();
        watched.start().unwrap();
        let abandoned_id = registry.insert(abandoned.clone());
        let watched_id = registry.insert(watched.clone());

        tokio::time::sleep(Duration::from_secs(20)).await;
        registry.get(watched_id).unwrap();
        assert_eq!(registry.evict_idle(Duration::from_secs(30)), 0);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(registry.evict_idle(Duration::from_secs(30)), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(abandoned.status().phase, Phase::Idle);
        assert_eq!(watched.status().phase, Phase::Waiting);
        assert!(matches!(
            registry.get(abandoned_id),
            Err(BridgeErr::UnknownSession(_))
        ));
        assert!(registry.get(watched_id).is_ok());
    }
}
