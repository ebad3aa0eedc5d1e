// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use super::{address_key, SharedBackend};
use crate::backend::BackendErr;
use crate::tracker::{PollableOperation, ProgressKind};
use crate::wallet::{self, ConversionRequest, SendOutput};
use async_trait::async_trait;
use log::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Amount received since `baseline`, if it reaches `threshold`. A zero
/// threshold accepts any increase.
fn received(baseline: Decimal, current: Decimal, threshold: Decimal) -> Option<Decimal> {
    let delta = current - baseline;
    if delta <= Decimal::ZERO || delta < threshold {
        return None;
    }

    Some(delta)
}

/// Waits for funds to arrive on a private address.
pub struct FundingWatch {
    backend: SharedBackend,
    address: String,
    min_increase: Decimal,
}

impl FundingWatch {
    pub fn new(backend: SharedBackend, address: &str, min_increase: Decimal) -> Self {
        Self {
            backend,
            address: address.to_owned(),
            min_increase: min_increase.max(Decimal::ZERO),
        }
    }
}

#[async_trait]
impl PollableOperation for FundingWatch {
    /// Balance when the watch started.
    type Receipt = Decimal;

    /// Amount received.
    type Outcome = Decimal;

    fn kind(&self) -> ProgressKind {
        ProgressKind::Funding
    }

    fn label(&self) -> String {
        format!("funding of {}", self.address)
    }

    fn resource_key(&self) -> Option<String> {
        Some(address_key(&self.address))
    }

    async fn submit(&self) -> Result<Decimal, BackendErr> {
        wallet::private_balance(self.backend.as_ref(), &self.address).await
    }

    async fn check(&self, baseline: &Decimal) -> Result<Option<Decimal>, BackendErr> {
        let balance = wallet::private_balance(self.backend.as_ref(), &self.address).await?;
        Ok(received(*baseline, balance, self.min_increase))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReceipt {
    /// Daemon operation id of the send.
    pub operation_id: String,

    /// Destination balance in the target currency before the send.
    pub baseline: Decimal,
}

/// Converts funds and waits until the converted amount shows up on the
/// destination address.
pub struct CurrencyConversion {
    backend: SharedBackend,
    from_address: String,
    destination: String,
    request: ConversionRequest,
}

impl CurrencyConversion {
    pub fn new(
        backend: SharedBackend,
        from_address: &str,
        destination: &str,
        request: ConversionRequest,
    ) -> Self {
        Self {
            backend,
            from_address: from_address.to_owned(),
            destination: destination.to_owned(),
            request,
        }
    }

    async fn destination_balance(&self) -> Result<Decimal, BackendErr> {
        wallet::currency_balance(
            self.backend.as_ref(),
            &self.destination,
            &self.request.convert_to,
        )
        .await
    }
}

#[async_trait]
impl PollableOperation for CurrencyConversion {
    type Receipt = ConversionReceipt;

    /// Amount received in the target currency.
    type Outcome = Decimal;

    fn kind(&self) -> ProgressKind {
        ProgressKind::Conversion
    }

    fn label(&self) -> String {
        format!(
            "conversion of {} {} to {}",
            self.request.amount, self.request.currency, self.request.convert_to
        )
    }

    fn resource_key(&self) -> Option<String> {
        Some(address_key(&self.destination))
    }

    async fn submit(&self) -> Result<ConversionReceipt, BackendErr> {
        let baseline = self.destination_balance().await?;
        let output = SendOutput {
            address: self.destination.clone(),
            amount: self.request.amount,
            currency: self.request.currency.clone(),
            convert_to: Some(self.request.convert_to.clone()),
            via: self.request.via.clone(),
        };

        let operation_id =
            wallet::send_currency(self.backend.as_ref(), &self.from_address, &[output]).await?;
        info!("Conversion submitted as {operation_id}");

        Ok(ConversionReceipt {
            operation_id,
            baseline,
        })
    }

    async fn check(&self, receipt: &ConversionReceipt) -> Result<Option<Decimal>, BackendErr> {
        let balance = self.destination_balance().await?;
        Ok(received(receipt.baseline, balance, Decimal::ZERO))
    }
}
