// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use super::{Backend, BackendErr};
use async_trait::async_trait;
use log::*;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const JSONRPC_VERSION: &str = "1.0";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC client for the wallet daemon.
pub struct RpcClient {
    inner: Client,
    url: Url,
    username: String,
    password: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, BackendErr> {
        let url = Url::parse(&format!("http://{host}:{port}/"))
            .map_err(|err| BackendErr::Transport(format!("invalid daemon address: {err}")))?;
        let inner = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            inner,
            url,
            username: username.to_owned(),
            password: password.to_owned(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_settings(settings: &crate::settings::Backend) -> Result<Self, BackendErr> {
        Self::new(
            &settings.rpc_host,
            settings.rpc_port,
            &settings.rpc_username,
            &settings.rpc_password,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    /// Returns the daemon endpoint used by the client.
    pub fn endpoint(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Backend for RpcClient {
    #[tracing::instrument(skip(self, args))]
    async fn invoke(&self, command: &str, args: Vec<Value>) -> Result<Value, BackendErr> {
        let payload = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: command,
            params: args,
        };

        let response = self
            .inner
            .post(self.url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        // RPC errors come back as HTTP 500 with the error in the body
        match serde_json::from_slice::<RpcResponse>(&body) {
            Ok(RpcResponse {
                error: Some(error), ..
            }) => {
                debug!("{command} failed with code {}: {}", error.code, error.message);
                Err(BackendErr::Rpc {
                    code: error.code,
                    message: error.message,
                })
            }
            Ok(RpcResponse { result, .. }) if status.is_success() => {
                Ok(result.unwrap_or(Value::Null))
            }
            Err(err) if status.is_success() => {
                Err(BackendErr::Parse(format!("{command}: {err}")))
            }
            _ => {
                warn!("{command} failed with HTTP status {status}");
                Err(BackendErr::HttpStatus(status.as_u16()))
            }
        }
    }
}
