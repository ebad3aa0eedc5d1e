// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Status text shown while an operation is waiting. Purely presentational,
//! the tracker never looks at it.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

const FIRST_TIER: Duration = Duration::from_secs(120);
const SECOND_TIER: Duration = Duration::from_secs(300);
const CONFIRMATION_SLOW_TIER: Duration = Duration::from_secs(600);
const CONVERSION_SLOW_TIER: Duration = Duration::from_secs(900);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// Waiting for a transaction to be mined.
    Confirmation,

    /// Waiting for a registered identity to become visible.
    Identity,

    /// Waiting for a currency conversion to settle.
    Conversion,

    /// Waiting for an address to be funded.
    Funding,

    /// Waiting for the chain to advance.
    Blocks,
}

/// Time elapsed between `started_at` and `now`. Zero if `now` is earlier.
pub fn elapsed(started_at: Instant, now: Instant) -> Duration {
    now.saturating_duration_since(started_at)
}

/// Index of the message tier for `elapsed`, from 0 to 3.
pub fn tier(kind: ProgressKind, elapsed: Duration) -> u8 {
    let slow_tier = match kind {
        ProgressKind::Conversion => CONVERSION_SLOW_TIER,
        _ => CONFIRMATION_SLOW_TIER,
    };

    if elapsed < FIRST_TIER {
        0
    } else if elapsed < SECOND_TIER {
        1
    } else if elapsed < slow_tier {
        2
    } else {
        3
    }
}

pub fn status_message(kind: ProgressKind, elapsed: Duration) -> &'static str {
    match (kind, tier(kind, elapsed)) {
        (ProgressKind::Confirmation, 0) => "Waiting for the transaction to be included in a block...",
        (ProgressKind::Identity, 0) => "Registering your identity on the blockchain...",
        (ProgressKind::Conversion, 0) => "Converting your funds...",
        (ProgressKind::Funding, 0) => "Waiting for funds to arrive...",
        (ProgressKind::Blocks, 0) => "Waiting for the next block...",
        (_, 1) => "Still waiting. Blocks can take a few minutes to be found.",
        (ProgressKind::Conversion, 2) => {
            "Conversions settle in batches, this can take up to fifteen minutes."
        }
        (_, 2) => "This is taking longer than usual.",
        _ => "The network is slow right now. You can keep waiting or try again later.",
    }
}

/// Formats `elapsed` as `1m 05s`, or `42s` under a minute.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}
