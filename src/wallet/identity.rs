// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use super::private_balance;
use crate::backend::{invoke_as, Backend, BackendErr};
use log::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Identity the wallet can log in with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedIdentity {
    /// Display name, `name@` or `name.parent@`.
    pub formatted_name: String,
    pub i_address: String,
    pub private_address: String,

    /// Private balance, `None` if it is not known.
    pub balance: Option<Decimal>,
}

/// Result of `registernamecommitment`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NameCommitment {
    pub txid: String,

    /// Reservation object, passed back verbatim on registration.
    pub name_reservation: Value,
}

impl NameCommitment {
    /// Registration request for the committed name.
    pub fn identity_bundle(&self, primary_address: &str, private_address: &str) -> Value {
        json!({
            "txid": self.txid,
            "namereservation": self.name_reservation,
            "identity": {
                "name": self.name_reservation["name"],
                "primaryaddresses": [primary_address],
                "minimumsignatures": 1,
                "privateaddress": private_address,
            }
        })
    }
}

/// Strips the system currency from a fully qualified name:
/// `alice.parent.VRSCTEST@` becomes `alice.parent@`.
pub fn transform_fully_qualified_name(fully_qualified_name: &str) -> String {
    let Some(at) = fully_qualified_name.rfind('@') else {
        return fully_qualified_name.to_owned();
    };

    match fully_qualified_name[..at].rfind('.') {
        Some(dot) => format!("{}@", &fully_qualified_name[..dot]),
        None => fully_qualified_name.to_owned(),
    }
}

/// Whether `name` has the `name@` shape the daemon expects.
pub fn is_identity_name(name: &str) -> bool {
    name.len() > 1 && name.ends_with('@')
}

fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

/// `(identityaddress, privateaddress)` of every identity we can both spend
/// and sign for.
fn spendable_identities(entries: &[Value]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|entry| {
            let details = entry.get("identity")?;
            let private_address = str_field(details, "privateaddress").filter(|s| !s.is_empty())?;
            let identity_address = str_field(details, "identityaddress")?;
            let can_spend = entry["canspendfor"].as_bool().unwrap_or(false);
            let can_sign = entry["cansignfor"].as_bool().unwrap_or(false);

            if !(can_spend && can_sign) {
                debug!("Skipping {identity_address}: canspendfor={can_spend}, cansignfor={can_sign}");
                return None;
            }

            Some((identity_address.to_owned(), private_address.to_owned()))
        })
        .collect()
}

/// Sorts by balance, highest first. Unknown balances count as zero.
pub fn sort_by_balance(identities: &mut [FormattedIdentity]) {
    identities.sort_by(|a, b| {
        let a = a.balance.unwrap_or_default();
        let b = b.balance.unwrap_or_default();
        b.partial_cmp(&a).unwrap_or(Ordering::Equal)
    });
}

/// Identities usable for login, without balances.
#[tracing::instrument(skip(backend))]
pub async fn login_identities_fast(
    backend: &dyn Backend,
) -> Result<Vec<FormattedIdentity>, BackendErr> {
    let entries: Vec<Value> = invoke_as(
        backend,
        "listidentities",
        vec![json!(true), json!(true), json!(true)],
    )
    .await?;

    let qualifying = spendable_identities(&entries);
    if qualifying.is_empty() {
        return Err(BackendErr::Rpc {
            code: -1,
            message: "No eligible identities found. Identities must have a private address and spending and signing permissions.".to_owned(),
        });
    }

    let mut identities = Vec::with_capacity(qualifying.len());
    for (i_address, private_address) in qualifying {
        match backend.invoke("getidentity", vec![json!(i_address)]).await {
            Ok(result) => match str_field(&result, "fullyqualifiedname") {
                Some(name) => identities.push(FormattedIdentity {
                    formatted_name: transform_fully_qualified_name(name),
                    i_address,
                    private_address,
                    balance: None,
                }),
                None => warn!("No fully qualified name for {i_address}, skipping"),
            },
            Err(err) => warn!("Failed to look up {i_address}: {err}, skipping"),
        }
    }

    if identities.is_empty() {
        return Err(BackendErr::Rpc {
            code: -1,
            message: "Failed to process identity names.".to_owned(),
        });
    }

    Ok(identities)
}

/// Identities usable for login with their balances, richest first.
pub async fn login_identities(backend: &dyn Backend) -> Result<Vec<FormattedIdentity>, BackendErr> {
    let mut identities = login_identities_fast(backend).await?;

    for identity in identities.iter_mut() {
        identity.balance = match private_balance(backend, &identity.private_address).await {
            Ok(balance) => Some(balance),
            Err(err) => {
                warn!("No balance for {}: {err}", identity.formatted_name);
                None
            }
        };
    }

    sort_by_balance(&mut identities);
    Ok(identities)
}

pub async fn identity_balance(
    backend: &dyn Backend,
    private_address: &str,
) -> Result<Decimal, BackendErr> {
    private_balance(backend, private_address).await
}

/// Checks that `identity_name` exists and has a private address.
pub async fn check_identity_eligibility(
    backend: &dyn Backend,
    identity_name: &str,
) -> Result<FormattedIdentity, BackendErr> {
    if !is_identity_name(identity_name) {
        return Err(BackendErr::InvalidFormat);
    }

    let result = match backend.invoke("getidentity", vec![json!(identity_name)]).await {
        Ok(result) => result,
        Err(err) if err.is_not_found() => return Err(BackendErr::NotFoundOrIneligible),
        Err(err) => return Err(err),
    };

    let details = result
        .get("identity")
        .ok_or(BackendErr::NotFoundOrIneligible)?;
    let private_address = str_field(details, "privateaddress")
        .filter(|s| !s.is_empty())
        .ok_or(BackendErr::NotFoundOrIneligible)?;

    let (Some(name), Some(i_address), Some(parent), Some(system)) = (
        str_field(details, "name"),
        str_field(details, "identityaddress"),
        str_field(details, "parent"),
        str_field(details, "systemid"),
    ) else {
        warn!("{identity_name} is missing required fields");
        return Err(BackendErr::NotFoundOrIneligible);
    };

    let mut formatted_name = format!("{name}@");

    // Sub-identities are shown as name.parent@
    if parent != system {
        match backend.invoke("getidentity", vec![json!(parent)]).await {
            Ok(parent_result) => match parent_result["identity"]["name"].as_str() {
                Some(parent_name) => formatted_name = format!("{name}.{parent_name}@"),
                None => warn!("Parent {parent} of {name} has no name"),
            },
            Err(err) => warn!("Failed to look up parent {parent} of {name}: {err}"),
        }
    }

    Ok(FormattedIdentity {
        formatted_name,
        i_address: i_address.to_owned(),
        private_address: private_address.to_owned(),
        balance: None,
    })
}

/// Returns `false` for names that are malformed or not registered.
pub async fn identity_exists(backend: &dyn Backend, identity_name: &str) -> Result<bool, BackendErr> {
    if !is_identity_name(identity_name) {
        return Ok(false);
    }

    match backend.invoke("getidentity", vec![json!(identity_name)]).await {
        Ok(_) => Ok(true),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) => Err(err),
    }
}

pub async fn get_identity(backend: &dyn Backend, identity_name: &str) -> Result<Value, BackendErr> {
    backend.invoke("getidentity", vec![json!(identity_name)]).await
}

/// New transparent address, used as control address.
pub async fn new_address(backend: &dyn Backend) -> Result<String, BackendErr> {
    invoke_as(backend, "getnewaddress", vec![]).await
}

pub async fn new_private_address(backend: &dyn Backend) -> Result<String, BackendErr> {
    invoke_as(backend, "z_getnewaddress", vec![]).await
}

pub async fn dump_privkey(backend: &dyn Backend, address: &str) -> Result<String, BackendErr> {
    invoke_as(backend, "dumpprivkey", vec![json!(address)]).await
}

pub async fn export_z_key(backend: &dyn Backend, address: &str) -> Result<String, BackendErr> {
    invoke_as(backend, "z_exportkey", vec![json!(address)]).await
}

/// Reserves `name`. Missing referral and parent are sent as empty strings.
pub async fn register_name_commitment(
    backend: &dyn Backend,
    name: &str,
    control_address: &str,
    referral: Option<&str>,
    parent: Option<&str>,
) -> Result<NameCommitment, BackendErr> {
    let result = backend
        .invoke(
            "registernamecommitment",
            vec![
                json!(name),
                json!(control_address),
                json!(referral.unwrap_or_default()),
                json!(parent.unwrap_or_default()),
            ],
        )
        .await?;

    let txid = str_field(&result, "txid")
        .ok_or_else(|| BackendErr::Parse("registernamecommitment: missing txid".to_owned()))?
        .to_owned();
    let name_reservation = result
        .get("namereservation")
        .cloned()
        .ok_or_else(|| BackendErr::Parse("registernamecommitment: missing namereservation".to_owned()))?;

    info!("Name commitment for {name} submitted in {txid}");
    Ok(NameCommitment {
        txid,
        name_reservation,
    })
}

/// Submits an identity registration and returns its transaction id.
pub async fn register_identity(backend: &dyn Backend, bundle: Value) -> Result<String, BackendErr> {
    let result = backend.invoke("registeridentity", vec![bundle]).await?;

    if let Some(txid) = result.as_str() {
        return Ok(txid.to_owned());
    }

    if let Some(txid) = str_field(&result, "txid") {
        return Ok(txid.to_owned());
    }

    warn!("Unexpected registeridentity response: {result}");
    Ok(result.to_string())
}

/// Confirmation count of `txid`. Transactions not in the wallet are looked
/// up through the raw transaction index.
pub async fn transaction_confirmations(backend: &dyn Backend, txid: &str) -> Result<u64, BackendErr> {
    let result = match backend.invoke("gettransaction", vec![json!(txid)]).await {
        Ok(result) => result,
        Err(err) => {
            debug!("gettransaction failed for {txid}: {err}, trying getrawtransaction");
            backend
                .invoke("getrawtransaction", vec![json!(txid), json!(true)])
                .await?
        }
    };

    Ok(result["confirmations"].as_u64().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use rust_decimal_macros::dec;

    fn not_found() -> BackendErr {
        BackendErr::Rpc {
            code: -5,
            message: "Identity not found".to_owned(),
        }
    }

    #[test]
    fn it_transforms_fully_qualified_names() {
        assert_eq!(transform_fully_qualified_name("alice.VRSCTEST@"), "alice@");
        assert_eq!(
            transform_fully_qualified_name("alice.parent.VRSCTEST@"),
            "alice.parent@"
        );
        assert_eq!(transform_fully_qualified_name("alice@"), "alice@");
        assert_eq!(transform_fully_qualified_name("alice"), "alice");
    }

    #[test]
    fn it_sorts_unknown_balances_last() {
        let identity = |name: &str, balance: Option<Decimal>| FormattedIdentity {
            formatted_name: name.to_owned(),
            i_address: String::new(),
            private_address: String::new(),
            balance,
        };
        let mut identities = vec![
            identity("a@", None),
            identity("b@", Some(dec!(1))),
            identity("c@", Some(dec!(5))),
        ];

        sort_by_balance(&mut identities);
        let names: Vec<_> = identities.iter().map(|i| i.formatted_name.as_str()).collect();
        assert_eq!(names, ["c@", "b@", "a@"]);
    }

    #[tokio::test]
    async fn it_lists_only_spendable_identities() {
        let backend = MockBackend::new();
        backend
            .respond_always(
                "listidentities",
                Ok(json!([
                    {
                        "identity": { "identityaddress": "iA", "privateaddress": "zsA" },
                        "canspendfor": true, "cansignfor": true
                    },
                    {
                        "identity": { "identityaddress": "iB", "privateaddress": "zsB" },
                        "canspendfor": true, "cansignfor": false
                    },
                    {
                        "identity": { "identityaddress": "iC", "privateaddress": "" },
                        "canspendfor": true, "cansignfor": true
                    },
                    {
                        "identity": { "identityaddress": "iD", "privateaddress": "zsD" },
                        "canspendfor": true, "cansignfor": true
                    }
                ])),
            )
            .respond(
                "getidentity",
                Ok(json!({ "fullyqualifiedname": "alice.VRSCTEST@" })),
            )
            .respond("getidentity", Err(BackendErr::Transport("reset".to_owned())))
            .respond("z_getbalance", Ok(json!(2.5)));

        let identities = login_identities(&backend).await.unwrap();
        assert_eq!(
            identities,
            vec![FormattedIdentity {
                formatted_name: "alice@".to_owned(),
                i_address: "iA".to_owned(),
                private_address: "zsA".to_owned(),
                balance: Some(dec!(2.5)),
            }]
        );
        assert_eq!(backend.calls("getidentity"), 2);
    }

    #[tokio::test]
    async fn it_fails_without_eligible_identities() {
        let backend = MockBackend::new();
        backend.respond_always("listidentities", Ok(json!([])));

        match login_identities_fast(&backend).await {
            Err(BackendErr::Rpc { code: -1, .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn it_formats_eligible_sub_identities() {
        let backend = MockBackend::new();
        backend
            .respond(
                "getidentity",
                Ok(json!({
                    "identity": {
                        "name": "bob",
                        "identityaddress": "iBob",
                        "privateaddress": "zsBob",
                        "parent": "iParent",
                        "systemid": "iSystem"
                    }
                })),
            )
            .respond(
                "getidentity",
                Ok(json!({ "identity": { "name": "agency" } })),
            );

        let identity = check_identity_eligibility(&backend, "bob.agency@").await.unwrap();
        assert_eq!(identity.formatted_name, "bob.agency@");
        assert_eq!(identity.private_address, "zsBob");
        assert_eq!(backend.args("getidentity")[1], vec![json!("iParent")]);
    }

    #[tokio::test]
    async fn it_rejects_ineligible_identities() {
        let backend = MockBackend::new();
        assert_eq!(
            check_identity_eligibility(&backend, "bob").await,
            Err(BackendErr::InvalidFormat)
        );
        assert_eq!(backend.calls("getidentity"), 0);

        backend.respond("getidentity", Err(not_found()));
        assert_eq!(
            check_identity_eligibility(&backend, "bob@").await,
            Err(BackendErr::NotFoundOrIneligible)
        );

        backend.respond(
            "getidentity",
            Ok(json!({ "identity": { "name": "bob", "privateaddress": "" } })),
        );
        assert_eq!(
            check_identity_eligibility(&backend, "bob@").await,
            Err(BackendErr::NotFoundOrIneligible)
        );

        backend.respond("getidentity", Err(BackendErr::HttpStatus(401)));
        assert_eq!(
            check_identity_eligibility(&backend, "bob@").await,
            Err(BackendErr::HttpStatus(401))
        );
    }

    #[tokio::test]
    async fn it_checks_identity_existence() {
        let backend = MockBackend::new();
        backend
            .respond("getidentity", Ok(json!({ "identity": {} })))
            .respond("getidentity", Err(not_found()))
            .respond("getidentity", Err(BackendErr::HttpStatus(500)))
            .respond("getidentity", Err(BackendErr::Transport("refused".to_owned())));

        assert_eq!(identity_exists(&backend, "alice@").await, Ok(true));
        assert_eq!(identity_exists(&backend, "alice@").await, Ok(false));
        assert_eq!(identity_exists(&backend, "alice@").await, Ok(false));
        assert!(identity_exists(&backend, "alice@").await.is_err());
        assert_eq!(identity_exists(&backend, "@").await, Ok(false));
        assert_eq!(backend.calls("getidentity"), 4);
    }

    #[tokio::test]
    async fn it_registers_name_commitments() {
        let backend = MockBackend::new();
        backend.respond_always(
            "registernamecommitment",
            Ok(json!({ "txid": "abc", "namereservation": { "name": "carol", "salt": "00" } })),
        );

        let commitment = register_name_commitment(&backend, "carol", "RControl", None, None)
            .await
            .unwrap();
        assert_eq!(commitment.txid, "abc");
        assert_eq!(
            backend.args("registernamecommitment"),
            vec![vec![json!("carol"), json!("RControl"), json!(""), json!("")]]
        );

        let bundle = commitment.identity_bundle("RControl", "zsCarol");
        assert_eq!(bundle["identity"]["name"], "carol");
        assert_eq!(bundle["identity"]["primaryaddresses"], json!(["RControl"]));
        assert_eq!(bundle["namereservation"]["salt"], "00");
    }

    #[tokio::test]
    async fn it_accepts_every_registration_response_shape() {
        let backend = MockBackend::new();
        backend
            .respond("registeridentity", Ok(json!("txid1")))
            .respond("registeridentity", Ok(json!({ "txid": "txid2" })))
            .respond("registeridentity", Ok(json!({ "hex": "00" })));

        assert_eq!(register_identity(&backend, json!({})).await, Ok("txid1".to_owned()));
        assert_eq!(register_identity(&backend, json!({})).await, Ok("txid2".to_owned()));
        assert_eq!(
            register_identity(&backend, json!({})).await,
            Ok("{\"hex\":\"00\"}".to_owned())
        );
    }

    #[tokio::test]
    async fn confirmations_fall_back_to_raw_transactions() {
        let backend = MockBackend::new();
        backend
            .respond("gettransaction", Ok(json!({ "confirmations": 3 })))
            .respond("gettransaction", Err(not_found()))
            .respond("getrawtransaction", Ok(json!({ "txid": "t" })));

        assert_eq!(transaction_confirmations(&backend, "t").await, Ok(3));
        assert_eq!(transaction_confirmations(&backend, "t").await, Ok(0));
        assert_eq!(
            backend.args("getrawtransaction"),
            vec![vec![json!("t"), json!(true)]]
        );
    }
}
