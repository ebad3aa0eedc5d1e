// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Invoke bridge the desktop UI calls into. Wallet commands are answered
//! directly, long running operations become tracker sessions the UI polls
//! by id.

use crate::backend::BackendErr;
use crate::operations::*;
use crate::prefs::{PreferenceStore, PrefsErr};
use crate::settings;
use crate::tracker::{PollableOperation, ResourceLocks, Tracker, TrackerConfig, TrackerErr, TrackerStatus};
use crate::wallet::{
    self, ConversionRequest, CurrencyDetails, FormattedIdentity, NameCommitment, NamespaceOption,
    UtxoInfo, WalletInfo,
};
use futures::future::BoxFuture;
use futures::prelude::*;
use log::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tarpc::context;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

mod http;
mod sessions;

pub use http::*;
pub use sessions::*;

/// Longest pause between two idle session sweeps.
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub type BridgeRequest = tarpc::ClientMessage<BridgeDefinitionRequest>;
pub type BridgeResponse = tarpc::Response<BridgeDefinitionResponse>;
pub type BridgeChannel = tarpc::transport::channel::UnboundedChannel<BridgeResponse, BridgeRequest>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BridgeErr {
    #[error(transparent)]
    Backend(#[from] BackendErr),

    #[error(transparent)]
    Tracker(#[from] TrackerErr),

    #[error("no tracker session with id {0}")]
    UnknownSession(u64),

    #[error("preferences unavailable: {0}")]
    Preferences(String),
}

impl From<PrefsErr> for BridgeErr {
    fn from(err: PrefsErr) -> Self {
        Self::Preferences(err.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCommitmentRequest {
    pub name: String,
    pub control_address: String,
    pub referral: Option<String>,
    pub parent: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentityRequest {
    /// Full name including the trailing `@`.
    pub identity_name: String,
    pub commitment: NameCommitment,
    pub primary_address: String,
    pub private_address: String,
}

#[tarpc::service]
pub trait BridgeDefinition {
    /// Seconds since the bridge started
    async fn uptime() -> i64;

    /// Current block height
    async fn block_height() -> Result<u64, BridgeErr>;

    /// Confirmed balance of a private address
    async fn private_balance(address: String) -> Result<Decimal, BridgeErr>;

    /// Private balance including unconfirmed notes
    async fn pending_balance(address: String) -> Result<Decimal, BridgeErr>;

    /// Summary of the spendable notes of a private address
    async fn utxo_info(address: String) -> Result<UtxoInfo, BridgeErr>;

    /// Expected amount a conversion yields
    async fn estimate_conversion(request: ConversionRequest) -> Result<Decimal, BridgeErr>;

    async fn wallet_info() -> Result<WalletInfo, BridgeErr>;

    /// Identities the wallet controls, without balances
    async fn login_identities_fast() -> Result<Vec<FormattedIdentity>, BridgeErr>;

    /// Identities the wallet controls, richest first
    async fn login_identities() -> Result<Vec<FormattedIdentity>, BridgeErr>;

    async fn identity_balance(private_address: String) -> Result<Decimal, BridgeErr>;

    /// Checks that the wallet can log in with the given identity
    async fn check_identity_eligibility(identity_name: String) -> Result<FormattedIdentity, BridgeErr>;

    async fn identity_exists(identity_name: String) -> Result<bool, BridgeErr>;

    async fn get_identity(identity_name: String) -> Result<Value, BridgeErr>;

    async fn new_address() -> Result<String, BridgeErr>;

    async fn new_private_address() -> Result<String, BridgeErr>;

    async fn dump_privkey(address: String) -> Result<String, BridgeErr>;

    async fn export_z_key(address: String) -> Result<String, BridgeErr>;

    /// Namespaces sub-identities can be registered under
    async fn available_namespaces() -> Result<Vec<NamespaceOption>, BridgeErr>;

    /// Root namespace of the configured chain
    async fn root_currency() -> Result<NamespaceOption, BridgeErr>;

    async fn get_currency(currency: String) -> Result<CurrencyDetails, BridgeErr>;

    /// Reserves a name and tracks the commitment until it is mined
    async fn start_name_commitment(request: NameCommitmentRequest) -> Result<u64, BridgeErr>;

    /// Registers a committed name and tracks it until it resolves
    async fn start_identity_registration(request: IdentityRequest) -> Result<u64, BridgeErr>;

    /// Converts funds and tracks them until they arrive
    async fn start_conversion(
        from_address: String,
        destination: String,
        request: ConversionRequest,
    ) -> Result<u64, BridgeErr>;

    /// Tracks a private address until it received at least `min_increase`
    async fn start_funding_watch(address: String, min_increase: Decimal) -> Result<u64, BridgeErr>;

    /// Tracks the chain until it grew by `blocks` blocks
    async fn start_block_wait(blocks: u64) -> Result<u64, BridgeErr>;

    async fn tracker_status(id: u64) -> Result<TrackerStatus<Value, Value>, BridgeErr>;

    /// Starts a new attempt of a finished or cancelled session
    async fn retry_tracker(id: u64) -> Result<(), BridgeErr>;

    async fn cancel_tracker(id: u64) -> Result<(), BridgeErr>;

    /// Cancels a session and forgets it
    async fn close_tracker(id: u64) -> Result<bool, BridgeErr>;

    async fn get_preference(key: String) -> Result<Option<String>, BridgeErr>;

    async fn set_preference(key: String, value: String) -> Result<(), BridgeErr>;
}

#[derive(Clone)]
pub struct Bridge {
    backend: SharedBackend,
    prefs: Arc<dyn PreferenceStore>,
    sessions: Arc<SessionRegistry>,
    locks: ResourceLocks,
    tracker: settings::Tracker,
    chain_id: String,
}

impl Bridge {
    pub fn new(
        backend: SharedBackend,
        prefs: Arc<dyn PreferenceStore>,
        tracker: settings::Tracker,
        chain_id: &str,
    ) -> Self {
        Self::with_locks(backend, prefs, tracker, chain_id, ResourceLocks::global())
    }

    pub fn with_locks(
        backend: SharedBackend,
        prefs: Arc<dyn PreferenceStore>,
        tracker: settings::Tracker,
        chain_id: &str,
        locks: ResourceLocks,
    ) -> Self {
        Self {
            backend,
            prefs,
            sessions: Arc::new(SessionRegistry::new()),
            locks,
            tracker,
            chain_id: chain_id.to_owned(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Spawns a task cancelling sessions the UI has not read for `idle`.
    /// Abort the returned handle to stop it.
    pub fn spawn_session_sweeper(&self, idle: Duration) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        let period = idle.clamp(Duration::from_secs(1), MAX_SWEEP_PERIOD);

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let evicted = sessions.evict_idle(idle);
                if evicted > 0 {
                    debug!("Dropped {evicted} idle sessions, {} left", sessions.len());
                }
            }
        })
    }

    fn start_session<O>(&self, op: O, config: TrackerConfig) -> Result<u64, BridgeErr>
    where
        O: PollableOperation,
        O::Receipt: Serialize,
        O::Outcome: Serialize,
    {
        let tracker = Tracker::with_locks(op, config, self.locks.clone());
        tracker.start()?;

        let label = tracker.operation().label();
        let id = self.sessions.insert(Arc::new(tracker));
        info!("Session {id}: started {label}");
        Ok(id)
    }
}

impl BridgeDefinition for Bridge {
    type UptimeFut = BoxFuture<'static, i64>;
    type BlockHeightFut = BoxFuture<'static, Result<u64, BridgeErr>>;
    type PrivateBalanceFut = BoxFuture<'static, Result<Decimal, BridgeErr>>;
    type PendingBalanceFut = BoxFuture<'static, Result<Decimal, BridgeErr>>;
    type UtxoInfoFut = BoxFuture<'static, Result<UtxoInfo, BridgeErr>>;
    type EstimateConversionFut = BoxFuture<'static, Result<Decimal, BridgeErr>>;
    type WalletInfoFut = BoxFuture<'static, Result<WalletInfo, BridgeErr>>;
    type LoginIdentitiesFastFut = BoxFuture<'static, Result<Vec<FormattedIdentity>, BridgeErr>>;
    type LoginIdentitiesFut = BoxFuture<'static, Result<Vec<FormattedIdentity>, BridgeErr>>;
    type IdentityBalanceFut = BoxFuture<'static, Result<Decimal, BridgeErr>>;
    type CheckIdentityEligibilityFut = BoxFuture<'static, Result<FormattedIdentity, BridgeErr>>;
    type IdentityExistsFut = BoxFuture<'static, Result<bool, BridgeErr>>;
    type GetIdentityFut = BoxFuture<'static, Result<Value, BridgeErr>>;
    type NewAddressFut = BoxFuture<'static, Result<String, BridgeErr>>;
    type NewPrivateAddressFut = BoxFuture<'static, Result<String, BridgeErr>>;
    type DumpPrivkeyFut = BoxFuture<'static, Result<String, BridgeErr>>;
    type ExportZKeyFut = BoxFuture<'static, Result<String, BridgeErr>>;
    type AvailableNamespacesFut = BoxFuture<'static, Result<Vec<NamespaceOption>, BridgeErr>>;
    type RootCurrencyFut = BoxFuture<'static, Result<NamespaceOption, BridgeErr>>;
    type GetCurrencyFut = BoxFuture<'static, Result<CurrencyDetails, BridgeErr>>;
    type StartNameCommitmentFut = BoxFuture<'static, Result<u64, BridgeErr>>;
    type StartIdentityRegistrationFut = BoxFuture<'static, Result<u64, BridgeErr>>;
    type StartConversionFut = BoxFuture<'static, Result<u64, BridgeErr>>;
    type StartFundingWatchFut = BoxFuture<'static, Result<u64, BridgeErr>>;
    type StartBlockWaitFut = BoxFuture<'static, Result<u64, BridgeErr>>;
    type TrackerStatusFut = BoxFuture<'static, Result<TrackerStatus<Value, Value>, BridgeErr>>;
    type RetryTrackerFut = BoxFuture<'static, Result<(), BridgeErr>>;
    type CancelTrackerFut = BoxFuture<'static, Result<(), BridgeErr>>;
    type CloseTrackerFut = BoxFuture<'static, Result<bool, BridgeErr>>;
    type GetPreferenceFut = BoxFuture<'static, Result<Option<String>, BridgeErr>>;
    type SetPreferenceFut = BoxFuture<'static, Result<(), BridgeErr>>;

    fn uptime(self, _: context::Context) -> Self::UptimeFut {
        future::ready(crate::global::uptime_secs()).boxed()
    }

    fn block_height(self, _: context::Context) -> Self::BlockHeightFut {
        async move { Ok(wallet::block_height(self.backend.as_ref()).await?) }.boxed()
    }

    fn private_balance(self, _: context::Context, address: String) -> Self::PrivateBalanceFut {
        async move { Ok(wallet::private_balance(self.backend.as_ref(), &address).await?) }.boxed()
    }

    fn pending_balance(self, _: context::Context, address: String) -> Self::PendingBalanceFut {
        async move { Ok(wallet::pending_balance(self.backend.as_ref(), &address).await?) }.boxed()
    }

    fn utxo_info(self, _: context::Context, address: String) -> Self::UtxoInfoFut {
        async move { Ok(wallet::utxo_info(self.backend.as_ref(), &address).await?) }.boxed()
    }

    fn estimate_conversion(
        self,
        _: context::Context,
        request: ConversionRequest,
    ) -> Self::EstimateConversionFut {
        async move { Ok(wallet::estimate_conversion(self.backend.as_ref(), &request).await?) }
            .boxed()
    }

    fn wallet_info(self, _: context::Context) -> Self::WalletInfoFut {
        async move { Ok(wallet::wallet_info(self.backend.as_ref()).await?) }.boxed()
    }

    fn login_identities_fast(self, _: context::Context) -> Self::LoginIdentitiesFastFut {
        async move { Ok(wallet::login_identities_fast(self.backend.as_ref()).await?) }.boxed()
    }

    fn login_identities(self, _: context::Context) -> Self::LoginIdentitiesFut {
        async move { Ok(wallet::login_identities(self.backend.as_ref()).await?) }.boxed()
    }

    fn identity_balance(
        self,
        _: context::Context,
        private_address: String,
    ) -> Self::IdentityBalanceFut {
        async move { Ok(wallet::identity_balance(self.backend.as_ref(), &private_address).await?) }
            .boxed()
    }

    fn check_identity_eligibility(
        self,
        _: context::Context,
        identity_name: String,
    ) -> Self::CheckIdentityEligibilityFut {
        async move {
            Ok(wallet::check_identity_eligibility(self.backend.as_ref(), &identity_name).await?)
        }
        .boxed()
    }

    fn identity_exists(self, _: context::Context, identity_name: String) -> Self::IdentityExistsFut {
        async move { Ok(wallet::identity_exists(self.backend.as_ref(), &identity_name).await?) }
            .boxed()
    }

    fn get_identity(self, _: context::Context, identity_name: String) -> Self::GetIdentityFut {
        async move { Ok(wallet::get_identity(self.backend.as_ref(), &identity_name).await?) }
            .boxed()
    }

    fn new_address(self, _: context::Context) -> Self::NewAddressFut {
        async move { Ok(wallet::new_address(self.backend.as_ref()).await?) }.boxed()
    }

    fn new_private_address(self, _: context::Context) -> Self::NewPrivateAddressFut {
        async move { Ok(wallet::new_private_address(self.backend.as_ref()).await?) }.boxed()
    }

    fn dump_privkey(self, _: context::Context, address: String) -> Self::DumpPrivkeyFut {
        async move { Ok(wallet::dump_privkey(self.backend.as_ref(), &address).await?) }.boxed()
    }

    fn export_z_key(self, _: context::Context, address: String) -> Self::ExportZKeyFut {
        async move { Ok(wallet::export_z_key(self.backend.as_ref(), &address).await?) }.boxed()
    }

    fn available_namespaces(self, _: context::Context) -> Self::AvailableNamespacesFut {
        async move { Ok(wallet::available_namespaces(self.backend.as_ref()).await?) }.boxed()
    }

    fn root_currency(self, _: context::Context) -> Self::RootCurrencyFut {
        async move { Ok(wallet::root_currency(self.backend.as_ref(), &self.chain_id).await?) }
            .boxed()
    }

    fn get_currency(self, _: context::Context, currency: String) -> Self::GetCurrencyFut {
        async move { Ok(wallet::get_currency(self.backend.as_ref(), &currency).await?) }.boxed()
    }

    fn start_name_commitment(
        self,
        _: context::Context,
        request: NameCommitmentRequest,
    ) -> Self::StartNameCommitmentFut {
        async move {
            let op = NameCommitmentOp::new(
                self.backend.clone(),
                &request.name,
                &request.control_address,
                request.referral,
                request.parent,
                self.tracker.min_confirmations,
            );
            self.start_session(op, TrackerConfig::confirmations(&self.tracker))
        }
        .boxed()
    }

    fn start_identity_registration(
        self,
        _: context::Context,
        request: IdentityRequest,
    ) -> Self::StartIdentityRegistrationFut {
        async move {
            let bundle = request
                .commitment
                .identity_bundle(&request.primary_address, &request.private_address);
            let op = IdentityRegistrationOp::new(self.backend.clone(), bundle, &request.identity_name);
            self.start_session(op, TrackerConfig::identities(&self.tracker))
        }
        .boxed()
    }

    fn start_conversion(
        self,
        _: context::Context,
        from_address: String,
        destination: String,
        request: ConversionRequest,
    ) -> Self::StartConversionFut {
        async move {
            let op = CurrencyConversion::new(self.backend.clone(), &from_address, &destination, request);
            self.start_session(op, TrackerConfig::conversions(&self.tracker))
        }
        .boxed()
    }

    fn start_funding_watch(
        self,
        _: context::Context,
        address: String,
        min_increase: Decimal,
    ) -> Self::StartFundingWatchFut {
        async move {
            let op = FundingWatch::new(self.backend.clone(), &address, min_increase);
            self.start_session(op, TrackerConfig::conversions(&self.tracker))
        }
        .boxed()
    }

    fn start_block_wait(self, _: context::Context, blocks: u64) -> Self::StartBlockWaitFut {
        async move {
            let op = BlockHeightAdvance::new(self.backend.clone(), blocks);
            self.start_session(op, TrackerConfig::confirmations(&self.tracker))
        }
        .boxed()
    }

    fn tracker_status(self, _: context::Context, id: u64) -> Self::TrackerStatusFut {
        future::ready(self.sessions.get(id).map(|session| session.status())).boxed()
    }

    fn retry_tracker(self, _: context::Context, id: u64) -> Self::RetryTrackerFut {
        async move {
            let session = self.sessions.get(id)?;
            info!("Session {id}: retrying {}", session.label());
            Ok(session.start()?)
        }
        .boxed()
    }

    fn cancel_tracker(self, _: context::Context, id: u64) -> Self::CancelTrackerFut {
        future::ready(self.sessions.get(id).map(|session| session.cancel())).boxed()
    }

    fn close_tracker(self, _: context::Context, id: u64) -> Self::CloseTrackerFut {
        let closed = match self.sessions.remove(id) {
            Some(session) => {
                debug!("Session {id}: closing {}", session.label());
                session.cancel();
                true
            }
            None => false,
        };

        future::ready(Ok(closed)).boxed()
    }

    fn get_preference(self, _: context::Context, key: String) -> Self::GetPreferenceFut {
        future::ready(self.prefs.get(&key).map_err(BridgeErr::from)).boxed()
    }

    fn set_preference(self, _: context::Context, key: String, value: String) -> Self::SetPreferenceFut {
        future::ready(self.prefs.set(&key, &value).map_err(BridgeErr::from)).boxed()
    }
}

/// Forwards a decoded HTTP request to the bridge server.
pub async fn dispatch_rpc_request(
    request: tarpc::Request<BridgeDefinitionRequest>,
    client: BridgeDefinitionClient,
) -> Result<BridgeDefinitionResponse, String> {
    client
        .0
        .call(context::current(), &request.id.to_string(), request.message)
        .await
        .map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::prefs::{MemoryPrefs, EXPLAINER_ACKNOWLEDGED};
    use crate::tracker::Phase;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;
    use tarpc::server::{self, Channel};

    fn bridge(backend: Arc<MockBackend>) -> Bridge {
        let tracker = settings::Tracker {
            poll_interval_secs: 10,
            confirmation_timeout_secs: 60,
            identity_timeout_secs: 60,
            conversion_timeout_secs: 0,
            min_confirmations: 1,
        };
        Bridge::with_locks(
            backend,
            Arc::new(MemoryPrefs::new()),
            tracker,
            "verus-testnet",
            ResourceLocks::new(),
        )
    }

    #[tokio::test]
    async fn it_answers_wallet_commands() {
        let backend = Arc::new(MockBackend::new());
        backend
            .respond_always("getblockcount", Ok(json!(1234)))
            .respond_always("z_getbalance", Ok(json!(2.5)));
        let bridge = bridge(backend);

        assert_eq!(bridge.clone().block_height(context::current()).await, Ok(1234));
        assert_eq!(
            bridge
                .private_balance(context::current(), "zs1a".to_owned())
                .await,
            Ok(dec!(2.5))
        );
    }

    #[tokio::test]
    async fn it_passes_daemon_errors_through() {
        let backend = Arc::new(MockBackend::new());
        let err = BackendErr::Rpc {
            code: -4,
            message: "wallet is locked".to_owned(),
        };
        backend.respond_always("getnewaddress", Err(err.clone()));

        assert_eq!(
            bridge(backend).new_address(context::current()).await,
            Err(BridgeErr::Backend(err))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn it_tracks_sessions_by_id() {
        let backend = Arc::new(MockBackend::new());
        backend
            .respond("getblockcount", Ok(json!(10)))
            .respond("getblockcount", Ok(json!(10)))
            .respond_always("getblockcount", Ok(json!(12)));
        let bridge = bridge(backend);

        let id = bridge
            .clone()
            .start_block_wait(context::current(), 2)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;

        let status = bridge
            .clone()
            .tracker_status(context::current(), id)
            .await
            .unwrap();
        assert_eq!(status.phase, Phase::Succeeded);
        assert_eq!(status.receipt, Some(json!(10)));
        assert_eq!(status.outcome, Some(json!(12)));

        assert_eq!(bridge.clone().close_tracker(context::current(), id).await, Ok(true));
        assert_eq!(bridge.clone().close_tracker(context::current(), id).await, Ok(false));
        assert_eq!(
            bridge.tracker_status(context::current(), id).await,
            Err(BridgeErr::UnknownSession(id))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sessions_can_be_retried() {
        let backend = Arc::new(MockBackend::new());
        backend
            .respond(
                "registernamecommitment",
                Err(BackendErr::Rpc {
                    code: -6,
                    message: "insufficient funds".to_owned(),
                }),
            )
            .respond_always(
                "registernamecommitment",
                Ok(json!({ "txid": "c0ffee", "namereservation": { "name": "ivy" } })),
            )
            .respond_always("gettransaction", Ok(json!({ "confirmations": 1 })));
        let bridge = bridge(backend);

        let request = NameCommitmentRequest {
            name: "ivy".to_owned(),
            control_address: "RCtl".to_owned(),
            referral: None,
            parent: None,
        };
        let id = bridge
            .clone()
            .start_name_commitment(context::current(), request)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let status = bridge.sessions().get(id).unwrap().status();
        assert_eq!(status.phase, Phase::Failed);
        assert_eq!(status.message, "insufficient funds");

        bridge.clone().retry_tracker(context::current(), id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let status = bridge.sessions().get(id).unwrap().status();
        assert_eq!(status.phase, Phase::Succeeded);
        assert_eq!(status.outcome.unwrap()["txid"], json!("c0ffee"));
    }

    #[tokio::test(start_paused = true)]
    async fn one_session_per_address() {
        let backend = Arc::new(MockBackend::new());
        backend.respond_always("z_getbalance", Ok(json!(1.0)));
        let bridge = bridge(backend);

        let id = bridge
            .clone()
            .start_funding_watch(context::current(), "zs1fund".to_owned(), dec!(1))
            .await
            .unwrap();
        assert_eq!(
            bridge
                .clone()
                .start_funding_watch(context::current(), "zs1fund".to_owned(), dec!(1))
                .await,
            Err(BridgeErr::Tracker(TrackerErr::ResourceBusy(
                "address:zs1fund".to_owned()
            )))
        );

        bridge.clone().cancel_tracker(context::current(), id).await.unwrap();
        assert_eq!(bridge.sessions().get(id).unwrap().status().phase, Phase::Idle);
        assert!(bridge
            .start_funding_watch(context::current(), "zs1fund".to_owned(), dec!(1))
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_sessions_are_swept_and_release_their_address() {
        let backend = Arc::new(MockBackend::new());
        backend.respond_always("z_getbalance", Ok(json!(1.0)));
        let locks = ResourceLocks::new();
        let bridge = Bridge::with_locks(
            backend.clone(),
            Arc::new(MemoryPrefs::new()),
            settings::Tracker {
                conversion_timeout_secs: 0,
                ..settings::Tracker::default()
            },
            "verus-testnet",
            locks.clone(),
        );
        let sweeper = bridge.spawn_session_sweeper(Duration::from_secs(120));

        let id = bridge
            .clone()
            .start_funding_watch(context::current(), "zs1gone".to_owned(), dec!(1))
            .await
            .unwrap();
        assert!(locks.is_held("address:zs1gone"));

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(bridge.sessions().len(), 1);

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(bridge.sessions().is_empty());
        assert!(!locks.is_held("address:zs1gone"));
        assert_eq!(
            bridge.clone().tracker_status(context::current(), id).await,
            Err(BridgeErr::UnknownSession(id))
        );

        let calls = backend.calls("z_getbalance");
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(backend.calls("z_getbalance"), calls);
        sweeper.abort();
    }

    #[tokio::test]
    async fn it_serves_requests_over_a_channel() {
        let backend = Arc::new(MockBackend::new());
        let bridge = bridge(backend);

        let (client_transport, server_transport) = tarpc::transport::channel::unbounded();
        let server = server::BaseChannel::with_defaults(server_transport);
        let client =
            BridgeDefinitionClient::new(tarpc::client::Config::default(), client_transport).spawn();
        tokio::spawn(server.execute(bridge.serve()));

        assert_eq!(
            client
                .get_preference(context::current(), EXPLAINER_ACKNOWLEDGED.to_owned())
                .await
                .unwrap(),
            Ok(None)
        );
        client
            .set_preference(
                context::current(),
                EXPLAINER_ACKNOWLEDGED.to_owned(),
                "true".to_owned(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            client
                .get_preference(context::current(), EXPLAINER_ACKNOWLEDGED.to_owned())
                .await
                .unwrap(),
            Ok(Some("true".to_owned()))
        );
    }
}
