// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use super::{identity_key, SharedBackend};
use crate::backend::BackendErr;
use crate::tracker::{PollableOperation, ProgressKind};
use crate::wallet::{self, NameCommitment};
use async_trait::async_trait;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserves a name and waits for the commitment to be mined.
pub struct NameCommitmentOp {
    backend: SharedBackend,
    name: String,
    control_address: String,
    referral: Option<String>,
    parent: Option<String>,
    min_confirmations: u64,
}

impl NameCommitmentOp {
    pub fn new(
        backend: SharedBackend,
        name: &str,
        control_address: &str,
        referral: Option<String>,
        parent: Option<String>,
        min_confirmations: u64,
    ) -> Self {
        Self {
            backend,
            name: name.to_owned(),
            control_address: control_address.to_owned(),
            referral: referral.filter(|r| !r.is_empty()),
            parent: parent.filter(|p| !p.is_empty()),
            min_confirmations: min_confirmations.max(1),
        }
    }

    /// Identity name the commitment reserves.
    pub fn identity_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}.{}@", self.name, parent),
            None => format!("{}@", self.name),
        }
    }
}

#[async_trait]
impl PollableOperation for NameCommitmentOp {
    type Receipt = NameCommitment;
    type Outcome = NameCommitment;

    fn kind(&self) -> ProgressKind {
        ProgressKind::Confirmation
    }

    fn label(&self) -> String {
        format!("name commitment for {}", self.identity_name())
    }

    fn resource_key(&self) -> Option<String> {
        Some(identity_key(&self.identity_name()))
    }

    async fn submit(&self) -> Result<NameCommitment, BackendErr> {
        wallet::register_name_commitment(
            self.backend.as_ref(),
            &self.name,
            &self.control_address,
            self.referral.as_deref(),
            self.parent.as_deref(),
        )
        .await
    }

    async fn check(&self, commitment: &NameCommitment) -> Result<Option<NameCommitment>, BackendErr> {
        let confirmations =
            wallet::transaction_confirmations(self.backend.as_ref(), &commitment.txid).await?;
        debug!(
            "{} has {confirmations}/{} confirmations",
            commitment.txid, self.min_confirmations
        );
        Ok((confirmations >= self.min_confirmations).then(|| commitment.clone()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredIdentity {
    pub identity_name: String,
    pub txid: String,
}

/// Registers an identity and waits until the daemon can resolve it.
pub struct IdentityRegistrationOp {
    backend: SharedBackend,
    bundle: Value,
    identity_name: String,
}

impl IdentityRegistrationOp {
    pub fn new(backend: SharedBackend, bundle: Value, identity_name: &str) -> Self {
        Self {
            backend,
            bundle,
            identity_name: identity_name.to_owned(),
        }
    }
}

#[async_trait]
impl PollableOperation for IdentityRegistrationOp {
    type Receipt = String;
    type Outcome = RegisteredIdentity;

    fn kind(&self) -> ProgressKind {
        ProgressKind::Identity
    }

    fn label(&self) -> String {
        format!("registration of {}", self.identity_name)
    }

    fn resource_key(&self) -> Option<String> {
        Some(identity_key(&self.identity_name))
    }

    async fn submit(&self) -> Result<String, BackendErr> {
        // Registering a name we could never look up would poll until timeout
        if !wallet::is_identity_name(&self.identity_name) {
            return Err(BackendErr::InvalidFormat);
        }

        wallet::register_identity(self.backend.as_ref(), self.bundle.clone()).await
    }

    async fn check(&self, txid: &String) -> Result<Option<RegisteredIdentity>, BackendErr> {
        let exists = wallet::identity_exists(self.backend.as_ref(), &self.identity_name).await?;
        Ok(exists.then(|| RegisteredIdentity {
            identity_name: self.identity_name.clone(),
            txid: txid.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::tracker::{Phase, ResourceLocks, Tracker, TrackerConfig, TrackerErr};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> TrackerConfig {
        TrackerConfig::bounded(Duration::from_secs(10), Duration::from_secs(30 * 60))
    }

    #[tokio::test(start_paused = true)]
    async fn it_waits_for_the_commitment_to_confirm() {
        let backend = Arc::new(MockBackend::new());
        backend
            .respond_always(
                "registernamecommitment",
                Ok(json!({ "txid": "c0ffee", "namereservation": { "name": "dave" } })),
            )
            .respond("gettransaction", Ok(json!({ "confirmations": 0 })))
            .respond("gettransaction", Ok(json!({ "confirmations": 0 })))
            .respond_always("gettransaction", Ok(json!({ "confirmations": 1 })));

        let op = NameCommitmentOp::new(backend.clone(), "dave", "RCtl", None, Some(String::new()), 1);
        assert_eq!(op.identity_name(), "dave@");
        let tracker = Tracker::with_locks(op, config(), ResourceLocks::new());

        tracker.start().unwrap();
        let commitment = tracker.wait().await.unwrap();
        assert_eq!(commitment.txid, "c0ffee");
        assert_eq!(tracker.status().elapsed_ms, 20_000);
        assert_eq!(backend.calls("registernamecommitment"), 1);
        assert_eq!(
            backend.args("registernamecommitment"),
            vec![vec![json!("dave"), json!("RCtl"), json!(""), json!("")]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_commitments_fail_with_the_daemon_message() {
        let backend = Arc::new(MockBackend::new());
        backend.respond_always(
            "registernamecommitment",
            Err(BackendErr::Rpc {
                code: -6,
                message: "insufficient funds".to_owned(),
            }),
        );

        let op = NameCommitmentOp::new(backend.clone(), "erin", "RCtl", None, Some("agency".to_owned()), 1);
        assert_eq!(op.identity_name(), "erin.agency@");
        let tracker = Tracker::with_locks(op, config(), ResourceLocks::new());

        tracker.start().unwrap();
        assert_eq!(
            tracker.wait().await,
            Err(TrackerErr::Submission("insufficient funds".to_owned()))
        );
        assert_eq!(backend.calls("gettransaction"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn it_waits_for_the_identity_to_resolve() {
        let backend = Arc::new(MockBackend::new());
        let not_found = BackendErr::Rpc {
            code: -5,
            message: "Identity not found".to_owned(),
        };
        backend
            .respond_always("registeridentity", Ok(json!({ "txid": "beef" })))
            .respond("getidentity", Err(not_found.clone()))
            .respond("getidentity", Err(BackendErr::Transport("reset".to_owned())))
            .respond("getidentity", Err(not_found))
            .respond_always("getidentity", Ok(json!({ "identity": { "name": "frank" } })));

        let tracker = Tracker::with_locks(
            IdentityRegistrationOp::new(backend.clone(), json!({ "identity": {} }), "frank@"),
            config(),
            ResourceLocks::new(),
        );

        tracker.start().unwrap();
        assert_eq!(
            tracker.wait().await,
            Ok(RegisteredIdentity {
                identity_name: "frank@".to_owned(),
                txid: "beef".to_owned(),
            })
        );

        let status = tracker.status();
        assert_eq!(status.phase, Phase::Succeeded);
        assert_eq!(status.transient_errors, 1);
        assert_eq!(status.elapsed_ms, 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_identity_names_are_never_registered() {
        let backend = Arc::new(MockBackend::new());
        backend
            .respond_always("registeridentity", Ok(json!({ "txid": "beef" })))
            .respond_always("getidentity", Ok(json!({ "identity": { "name": "frank" } })));

        for name in ["frank", "@", ""] {
            let tracker = Tracker::with_locks(
                IdentityRegistrationOp::new(backend.clone(), json!({ "identity": {} }), name),
                config(),
                ResourceLocks::new(),
            );

            tracker.start().unwrap();
            assert_eq!(
                tracker.wait().await,
                Err(TrackerErr::Submission("invalid identity format".to_owned()))
            );
            assert_eq!(tracker.phase(), Phase::Failed);
        }

        assert_eq!(backend.calls("registeridentity"), 0);
        assert_eq!(backend.calls("getidentity"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn commitments_and_registrations_share_the_identity_lock() {
        let backend = Arc::new(MockBackend::new());
        backend
            .respond_always(
                "registernamecommitment",
                Ok(json!({ "txid": "t", "namereservation": {} })),
            )
            .respond_always("gettransaction", Ok(json!({ "confirmations": 0 })));

        let locks = ResourceLocks::new();
        let commitment = Tracker::with_locks(
            NameCommitmentOp::new(backend.clone(), "gina", "RCtl", None, None, 1),
            config(),
            locks.clone(),
        );
        let registration = Tracker::with_locks(
            IdentityRegistrationOp::new(backend.clone(), json!({}), "gina@"),
            config(),
            locks,
        );

        commitment.start().unwrap();
        assert_eq!(
            registration.start(),
            Err(TrackerErr::ResourceBusy("identity:gina@".to_owned()))
        );
    }
}
