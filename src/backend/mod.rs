// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Boundary to the wallet daemon. Every call the crate makes goes through
//! [`Backend::invoke`], which dispatches a named command with positional
//! arguments and returns the untyped JSON result.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod rpc_client;
pub use rpc_client::*;

#[cfg(test)]
pub(crate) mod mock;

/// Daemon error code for an unknown address or key. `getidentity` answers
/// with it while an identity is not registered yet.
pub const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

/// Daemon error code for an invalid parameter.
pub const RPC_INVALID_PARAMETER: i64 = -8;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Dispatches `command` with positional `args` to the daemon.
    async fn invoke(&self, command: &str, args: Vec<Value>) -> Result<Value, BackendErr>;
}

/// Invokes `command` and deserializes the result into `T`.
pub async fn invoke_as<T: DeserializeOwned>(
    backend: &dyn Backend,
    command: &str,
    args: Vec<Value>,
) -> Result<T, BackendErr> {
    let value = backend.invoke(command, args).await?;
    serde_json::from_value(value).map_err(|err| BackendErr::Parse(format!("{command}: {err}")))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BackendErr {
    #[error("could not reach the wallet daemon: {0}")]
    Transport(String),

    #[error("wallet daemon answered with HTTP status {0}")]
    HttpStatus(u16),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("failed to parse daemon response: {0}")]
    Parse(String),

    #[error("invalid identity format")]
    InvalidFormat,

    #[error("identity not found or not eligible")]
    NotFoundOrIneligible,

    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
}

impl BackendErr {
    /// Returns `true` if the daemon reported that the queried entity does
    /// not exist. A bare HTTP 500 from `getidentity` means the same thing.
    pub fn is_not_found(&self) -> bool {
        match self {
            BackendErr::Rpc { code, .. } => {
                *code == RPC_INVALID_ADDRESS_OR_KEY || *code == RPC_INVALID_PARAMETER
            }
            BackendErr::HttpStatus(500) => true,
            BackendErr::NotFoundOrIneligible => true,
            _ => false,
        }
    }

    /// Message suitable for showing to the user. Daemon errors are passed
    /// through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            BackendErr::Rpc { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for BackendErr {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => BackendErr::HttpStatus(status.as_u16()),
            None => BackendErr::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for BackendErr {
    fn from(err: serde_json::Error) -> Self {
        BackendErr::Parse(err.to_string())
    }
}
