// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Namespaces an identity can be registered under.

use crate::backend::{invoke_as, Backend, BackendErr};
use futures::future::join_all;
use log::*;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

/// Number of `getcurrency` calls issued concurrently.
const RESOLVE_BATCH_SIZE: usize = 5;

/// Pause between two batches of `getcurrency` calls.
const RESOLVE_BATCH_PAUSE: Duration = Duration::from_millis(100);

/// Currency options of namespaces that accept registrations.
const REGISTRABLE_OPTIONS: [u32; 2] = [33, 41];

/// Options reported for root currencies.
const ROOT_CURRENCY_OPTIONS: u32 = 41;

const SATOSHIS: Decimal = dec!(100000000);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyDefinition {
    pub name: String,
    #[serde(rename = "currencyid")]
    pub currency_id: String,
    #[serde(default)]
    pub options: u32,
    #[serde(rename = "proofprotocol", default)]
    pub proof_protocol: u32,
    #[serde(rename = "idregistrationfees", default)]
    pub id_registration_fees: Decimal,
    #[serde(rename = "idimportfees", default)]
    pub id_import_fees: Decimal,
    #[serde(rename = "idreferrallevels", default)]
    pub id_referral_levels: u32,
    #[serde(rename = "fullyqualifiedname", default)]
    pub fully_qualified_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveCurrency {
    #[serde(rename = "currencyid")]
    pub currency_id: String,
    #[serde(default)]
    pub reserves: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyState {
    #[serde(rename = "reservecurrencies", default)]
    pub reserve_currencies: Option<Vec<ReserveCurrency>>,
}

/// Entry of `listcurrencies`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedCurrency {
    #[serde(rename = "currencydefinition")]
    pub definition: CurrencyDefinition,
    #[serde(rename = "bestcurrencystate", default)]
    pub state: CurrencyState,
}

/// Result of `getcurrency`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyDetails {
    pub name: String,
    #[serde(rename = "currencyid")]
    pub currency_id: String,
    #[serde(rename = "idregistrationfees", default)]
    pub id_registration_fees: Decimal,
    #[serde(rename = "idreferrallevels", default)]
    pub id_referral_levels: u32,
    #[serde(rename = "fullyqualifiedname", default)]
    pub fully_qualified_name: Option<String>,
    #[serde(rename = "currencynames", default)]
    pub currency_names: Option<HashMap<String, String>>,
    #[serde(rename = "bestcurrencystate", default)]
    pub state: Option<CurrencyState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceOption {
    pub name: String,
    pub currency_id: String,
    pub registration_fee: Decimal,
    pub fully_qualified_name: String,
    pub fee_currency_name: String,
    pub options: u32,
    pub id_referral_levels: u32,
}

/// Root currency of a chain id.
pub fn root_currency_name(chain_id: &str) -> Option<&'static str> {
    match chain_id {
        "verus-testnet" => Some("vrsctest"),
        "verus" => Some("vrsc"),
        "chips" => Some("chips"),
        "vdex" => Some("vdex"),
        "varrr" => Some("varrr"),
        _ => None,
    }
}

/// A namespace accepts registrations if it has the right options, uses the
/// chain's own proof protocol and every reserve is funded.
pub fn is_registrable(currency: &ListedCurrency) -> bool {
    let def = &currency.definition;
    if !REGISTRABLE_OPTIONS.contains(&def.options) || def.proof_protocol != 1 {
        return false;
    }

    match &currency.state.reserve_currencies {
        Some(reserves) if !reserves.is_empty() => {
            reserves.iter().all(|reserve| reserve.reserves > Decimal::ZERO)
        }
        _ => false,
    }
}

/// Import fees of 0.00000000 to 0.00000009 select the reserve currency the
/// registration fee is paid in.
pub fn fee_reserve_index(id_import_fees: Decimal) -> Option<usize> {
    (id_import_fees * SATOSHIS)
        .round()
        .to_i64()
        .filter(|index| (0..=9).contains(index))
        .map(|index| index as usize)
}

/// Name of the currency registrations under `def` are paid in.
pub fn resolve_fee_currency_name(def: &CurrencyDefinition, details: &CurrencyDetails) -> String {
    let Some(index) = fee_reserve_index(def.id_import_fees) else {
        return def.name.clone();
    };

    let Some(names) = &details.currency_names else {
        return "UnknownCurrency".to_owned();
    };

    let Some(state) = &details.state else {
        return "UnknownReserve".to_owned();
    };

    let Some(reserves) = &state.reserve_currencies else {
        return "NoReserves".to_owned();
    };

    match reserves.get(index) {
        Some(reserve) => names
            .get(&reserve.currency_id)
            .cloned()
            .unwrap_or_else(|| format!("Unknown_{index}")),
        None => format!("InvalidIndex_{index}"),
    }
}

pub async fn get_currency(backend: &dyn Backend, currency: &str) -> Result<CurrencyDetails, BackendErr> {
    invoke_as(backend, "getcurrency", vec![json!(currency)]).await
}

async fn resolve_namespace(
    backend: &dyn Backend,
    currency: &ListedCurrency,
) -> Result<NamespaceOption, BackendErr> {
    let def = &currency.definition;
    let details = get_currency(backend, &def.currency_id).await?;
    let fee_currency_name = resolve_fee_currency_name(def, &details);

    Ok(NamespaceOption {
        name: def.name.clone(),
        currency_id: def.currency_id.clone(),
        registration_fee: def.id_registration_fees,
        fully_qualified_name: def.fully_qualified_name.clone(),
        fee_currency_name,
        options: def.options,
        id_referral_levels: def.id_referral_levels,
    })
}

/// Namespaces accepting registrations, sorted by name. Namespaces whose fee
/// currency cannot be resolved are left out.
#[tracing::instrument(skip(backend))]
pub async fn available_namespaces(backend: &dyn Backend) -> Result<Vec<NamespaceOption>, BackendErr> {
    let currencies: Vec<ListedCurrency> = invoke_as(backend, "listcurrencies", vec![]).await?;
    let registrable: Vec<_> = currencies.into_iter().filter(is_registrable).collect();
    debug!("{} registrable namespaces", registrable.len());

    let mut namespaces = Vec::with_capacity(registrable.len());
    for (i, batch) in registrable.chunks(RESOLVE_BATCH_SIZE).enumerate() {
        if i > 0 {
            tokio::time::sleep(RESOLVE_BATCH_PAUSE).await;
        }

        let resolved = join_all(batch.iter().map(|currency| resolve_namespace(backend, currency))).await;
        for (currency, result) in batch.iter().zip(resolved) {
            match result {
                Ok(namespace) => namespaces.push(namespace),
                Err(err) => warn!("Skipping namespace {}: {err}", currency.definition.name),
            }
        }
    }

    namespaces.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(namespaces)
}

/// The chain's own currency as a namespace. Fees are paid in itself.
pub async fn root_currency(backend: &dyn Backend, chain_id: &str) -> Result<NamespaceOption, BackendErr> {
    let name = root_currency_name(chain_id)
        .ok_or_else(|| BackendErr::UnsupportedChain(chain_id.to_owned()))?;
    let details = get_currency(backend, name).await?;

    Ok(NamespaceOption {
        fully_qualified_name: details.name.clone(),
        fee_currency_name: details.name.clone(),
        name: details.name,
        currency_id: details.currency_id,
        registration_fee: details.id_registration_fees,
        options: ROOT_CURRENCY_OPTIONS,
        id_referral_levels: details.id_referral_levels,
    })
}
