// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use super::{Backend, BackendErr};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

type Reply = Result<Value, BackendErr>;

/// Scripted daemon used by unit tests. Queued replies are consumed first,
/// then the standing reply for the command is returned.
#[derive(Default)]
pub(crate) struct MockBackend {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    standing: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a one-shot reply for `command`.
    pub fn respond(&self, command: &str, reply: Reply) -> &Self {
        self.queued
            .lock()
            .entry(command.to_owned())
            .or_default()
            .push_back(reply);
        self
    }

    /// Sets the reply returned once the queue for `command` is empty.
    pub fn respond_always(&self, command: &str, reply: Reply) -> &Self {
        self.standing.lock().insert(command.to_owned(), reply);
        self
    }

    pub fn calls(&self, command: &str) -> usize {
        self.calls.lock().iter().filter(|(c, _)| c == command).count()
    }

    pub fn args(&self, command: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .iter()
            .filter(|(c, _)| c == command)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn invoke(&self, command: &str, args: Vec<Value>) -> Result<Value, BackendErr> {
        self.calls.lock().push((command.to_owned(), args));

        if let Some(reply) = self
            .queued
            .lock()
            .get_mut(command)
            .and_then(|queue| queue.pop_front())
        {
            return reply;
        }

        match self.standing.lock().get(command) {
            Some(reply) => reply.clone(),
            None => Err(BackendErr::Rpc {
                code: -32601,
                message: "Method not found".to_owned(),
            }),
        }
    }
}
