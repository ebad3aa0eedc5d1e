// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use super::{dispatch_rpc_request, BridgeDefinitionClient, BridgeDefinitionRequest};
use crate::settings;
use log::*;
use std::sync::Arc;
use warp::Filter;

const HASH_CONTEXT: &str = "idwallet 2023 bridge basic auth";

/// Maximum accepted request body.
pub const MAX_BODY_BYTES: u64 = 1024 * 64;

/// Credentials the UI must present.
#[derive(Clone, Debug)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }

    pub fn from_settings(settings: &settings::Bridge) -> Self {
        Self::new(&settings.username, &settings.password)
    }

    /// Checks a `Basic` authorization header.
    pub fn check_authorization_header(&self, auth: &str) -> bool {
        let split: Vec<_> = auth.split(' ').collect();

        if split.len() != 2 {
            return false;
        }

        if split[0] != "Basic" {
            return false;
        }

        let decoded = match base64::decode(split[1]) {
            Ok(decoded) => decoded,
            Err(_) => return false,
        };

        // Hash both sides so the comparison runs over equal lengths
        let oracle_key = format!("{}:{}", self.username, self.password);
        let oracle_hash = blake3::derive_key(HASH_CONTEXT, oracle_key.as_bytes());
        let hash = blake3::derive_key(HASH_CONTEXT, &decoded);

        constant_time_eq::constant_time_eq_32(&oracle_hash, &hash)
    }
}

/// `POST /` route forwarding authorized requests to the bridge client.
pub fn routes(
    client: BridgeDefinitionClient,
    credentials: Credentials,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let credentials = Arc::new(credentials);
    let client_filter = warp::any().map(move || client.clone());
    let credentials_filter = warp::any().map(move || credentials.clone());

    warp::post()
        .and(warp::path::end())
        .and(json_body())
        .and(client_filter)
        .and(credentials_filter)
        .and(warp::header("authorization"))
        .and_then(handle_rpc_request)
}

async fn handle_rpc_request(
    request: tarpc::Request<BridgeDefinitionRequest>,
    client: BridgeDefinitionClient,
    credentials: Arc<Credentials>,
    authorization: String,
) -> Result<impl warp::Reply, warp::Rejection> {
    if !credentials.check_authorization_header(&authorization) {
        warn!("Rejected bridge request with bad credentials");
        return Ok(warp::reply::with_status(
            warp::reply::json(&"Forbidden".to_owned()),
            warp::http::StatusCode::FORBIDDEN,
        ));
    }

    match dispatch_rpc_request(request, client).await {
        Ok(resp) => Ok(warp::reply::with_status(
            warp::reply::json(&resp),
            warp::http::StatusCode::CREATED,
        )),

        Err(err) => Ok(warp::reply::with_status(
            warp::reply::json(&err),
            warp::http::StatusCode::BAD_REQUEST,
        )),
    }
}

fn json_body(
) -> impl Filter<Extract = (tarpc::Request<BridgeDefinitionRequest>,), Error = warp::Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_BYTES)
        .and(warp::body::json::<tarpc::Request<BridgeDefinitionRequest>>())
}
