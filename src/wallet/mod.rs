// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Typed wrappers over the wallet daemon commands the UI needs.

use crate::backend::{invoke_as, Backend, BackendErr};
use log::*;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;

mod identity;
mod namespace;

pub use identity::*;
pub use namespace::*;

/// Smallest output that is worth spending.
pub const MIN_USABLE_UTXO: Decimal = dec!(0.0001);

/// Fee assumed when the daemon does not report one.
pub const DEFAULT_PAY_TX_FEE: Decimal = dec!(0.0001);

/// Summary of the unspent outputs of an address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInfo {
    /// Count including dust.
    pub total_utxos: u32,

    /// Count of outputs of at least [`MIN_USABLE_UTXO`].
    pub usable_utxos: u32,

    /// Sum of usable outputs only.
    pub total_spendable_value: Decimal,

    pub largest_utxo: Decimal,

    /// Smallest usable output, 0 if there are none.
    pub smallest_utxo: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub currency: String,
    pub convert_to: String,
    pub via: Option<String>,
    pub amount: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub balance: Decimal,
    pub unconfirmed_balance: Decimal,
    pub reserve_balance: HashMap<String, Decimal>,
    pub pay_tx_fee: Decimal,
}

/// One output of a `sendcurrency` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutput {
    pub address: String,
    pub amount: Decimal,
    pub currency: String,
    pub convert_to: Option<String>,
    pub via: Option<String>,
}

impl SendOutput {
    fn to_json(&self) -> Value {
        let mut output = json!({
            "address": self.address,
            "amount": amount_to_json(self.amount),
            "currency": self.currency,
        });

        if let Some(convert_to) = &self.convert_to {
            output["convertto"] = json!(convert_to);
        }

        if let Some(via) = &self.via {
            output["via"] = json!(via);
        }

        output
    }
}

/// Reads an amount the daemon sent either as a JSON number or a string.
pub fn parse_amount(value: &Value) -> Option<Decimal> {
    let repr = match value {
        Value::Number(number) => number.to_string(),
        Value::String(string) => string.trim().to_owned(),
        _ => return None,
    };

    Decimal::from_str(&repr)
        .or_else(|_| Decimal::from_scientific(&repr))
        .ok()
}

fn amount_field(value: &Value, field: &str) -> Decimal {
    parse_amount(&value[field]).unwrap_or_default()
}

fn expect_amount(command: &str, value: &Value) -> Result<Decimal, BackendErr> {
    parse_amount(value)
        .ok_or_else(|| BackendErr::Parse(format!("{command}: expected an amount, got {value}")))
}

pub(crate) fn amount_to_json(amount: Decimal) -> Value {
    json!(amount.to_f64().unwrap_or_default())
}

/// Summarizes the `amount` fields of a `z_listunspent` result.
pub fn summarize_utxos(utxos: &[Value]) -> UtxoInfo {
    let mut info = UtxoInfo::default();
    let mut smallest: Option<Decimal> = None;

    for utxo in utxos {
        let amount = amount_field(utxo, "amount");
        info.total_utxos += 1;
        info.largest_utxo = info.largest_utxo.max(amount);

        if amount >= MIN_USABLE_UTXO {
            info.usable_utxos += 1;
            info.total_spendable_value += amount;
            smallest = Some(smallest.map_or(amount, |s| s.min(amount)));
        }
    }

    info.smallest_utxo = smallest.unwrap_or_default();
    info
}

pub async fn block_height(backend: &dyn Backend) -> Result<u64, BackendErr> {
    invoke_as(backend, "getblockcount", vec![]).await
}

/// Confirmed balance of a private address.
pub async fn private_balance(backend: &dyn Backend, address: &str) -> Result<Decimal, BackendErr> {
    let value = backend.invoke("z_getbalance", vec![json!(address)]).await?;
    expect_amount("z_getbalance", &value)
}

/// Balance of a private address including unconfirmed notes.
pub async fn pending_balance(backend: &dyn Backend, address: &str) -> Result<Decimal, BackendErr> {
    let value = backend
        .invoke("z_getbalance", vec![json!(address), json!(0)])
        .await?;
    expect_amount("z_getbalance", &value)
}

/// Balance of `address` in `currency`. Currencies the address never held
/// count as zero.
pub async fn currency_balance(
    backend: &dyn Backend,
    address: &str,
    currency: &str,
) -> Result<Decimal, BackendErr> {
    let balances = backend
        .invoke("getcurrencybalance", vec![json!(address)])
        .await?;
    let balances = balances
        .as_object()
        .ok_or_else(|| BackendErr::Parse("getcurrencybalance: expected an object".to_owned()))?;

    Ok(balances
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(currency))
        .and_then(|(_, amount)| parse_amount(amount))
        .unwrap_or_default())
}

pub async fn utxo_info(backend: &dyn Backend, address: &str) -> Result<UtxoInfo, BackendErr> {
    let utxos: Vec<Value> = invoke_as(
        backend,
        "z_listunspent",
        vec![json!(1), json!(9999999), json!(false), json!([address])],
    )
    .await?;

    let info = summarize_utxos(&utxos);
    debug!(
        "{address}: {} outputs, {} usable, {} spendable",
        info.total_utxos, info.usable_utxos, info.total_spendable_value
    );
    Ok(info)
}

/// Estimated amount received when converting `request.amount`.
pub async fn estimate_conversion(
    backend: &dyn Backend,
    request: &ConversionRequest,
) -> Result<Decimal, BackendErr> {
    let mut params = json!({
        "currency": request.currency,
        "convertto": request.convert_to,
        "amount": amount_to_json(request.amount),
    });

    if let Some(via) = &request.via {
        params["via"] = json!(via);
    }

    let response = backend.invoke("estimateconversion", vec![params]).await?;
    expect_amount("estimateconversion", &response["estimatedcurrencyout"])
}

pub async fn wallet_info(backend: &dyn Backend) -> Result<WalletInfo, BackendErr> {
    let response = backend.invoke("getwalletinfo", vec![]).await?;

    let reserve_balance: HashMap<String, Decimal> = response["reserve_balance"]
        .as_object()
        .map(|reserves| {
            reserves
                .iter()
                .filter_map(|(currency, amount)| Some((currency.clone(), parse_amount(amount)?)))
                .collect()
        })
        .unwrap_or_default();

    Ok(WalletInfo {
        balance: amount_field(&response, "balance"),
        unconfirmed_balance: amount_field(&response, "unconfirmed_balance"),
        reserve_balance,
        pay_tx_fee: parse_amount(&response["paytxfee"]).unwrap_or(DEFAULT_PAY_TX_FEE),
    })
}

/// Sends from `from_address` and returns the daemon's operation id.
pub async fn send_currency(
    backend: &dyn Backend,
    from_address: &str,
    outputs: &[SendOutput],
) -> Result<String, BackendErr> {
    let outputs: Vec<Value> = outputs.iter().map(SendOutput::to_json).collect();
    invoke_as(backend, "sendcurrency", vec![json!(from_address), json!(outputs)]).await
}
