// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Multi-chain lottery indexer: keeps per-chain node connections alive,
//! replays missed ranges, decodes lottery events into canonical form and
//! applies them idempotently to Postgres.

use std::time::Duration;

pub mod applier;
pub mod backfill;
pub mod chain;
pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod metrics;
pub mod notify;
pub mod server;
pub mod store;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_utils;

pub const INDEXER_NAME: &str = "lotto-indexer";

/// Reads the latest chain height with bounded retries; used at connect time
/// where a single flaky answer should not burn a reconnect attempt.
pub async fn probe_height_with_retries(
    adapter: &dyn chain::ChainAdapter,
    max_elapsed_time: Duration,
) -> Result<u64, error::IndexerError> {
    match retry_with_max_elapsed_time!(adapter.latest_height(), max_elapsed_time) {
        Ok(result) => result,
        Err(e) => Err(e),
    }
}

#[macro_export]
macro_rules! retry_with_max_elapsed_time {
    ($func:expr, $max_elapsed_time:expr) => {{
        // The following delay sequence (in secs) will be used, applied with jitter
        // 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 30, 60, 120, 120 ...
        let backoff = backoff::ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: std::time::Duration::from_secs(120),
            max_elapsed_time: Some($max_elapsed_time),
            ..Default::default()
        };
        backoff::future::retry(backoff, || {
            let fut = async {
                let result = $func.await;
                match result {
                    Ok(_) => {
                        return Ok(result);
                    }
                    Err(e) => {
                        // For simplicity we treat every error as transient so we can retry until max_elapsed_time
                        tracing::debug!("Retrying due to error: {:?}", e);
                        return Err(backoff::Error::transient(e));
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}
