// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Downstream invocation boundaries. The indexer's job ends at these traits;
//! fan-out to users and the randomness-rotation automation live elsewhere.

use async_trait::async_trait;
use tracing::info;

use crate::events::WinnerPicked;

#[async_trait]
pub trait WinNotifier: Send + Sync {
    /// Called exactly once per persisted win (never on duplicates).
    async fn notify_winner(&self, chain_name: &str, ev: &WinnerPicked);
}

#[async_trait]
pub trait AutomationTrigger: Send + Sync {
    /// Called when the program signals that all randomness request slots are
    /// consumed and the next batch should be prepared.
    async fn all_requests_completed(&self, chain_name: &str, contract_key: &str);
}

/// Default notifier: structured log only.
pub struct LogWinNotifier;

#[async_trait]
impl WinNotifier for LogWinNotifier {
    async fn notify_winner(&self, chain_name: &str, ev: &WinnerPicked) {
        info!(
            "[{chain_name}] winner picked: round {} token {} winner {} prize {}",
            ev.round_id, ev.token, ev.winner, ev.prize_amount
        );
    }
}

/// Default automation trigger: structured log only.
pub struct LogAutomationTrigger;

#[async_trait]
impl AutomationTrigger for LogAutomationTrigger {
    async fn all_requests_completed(&self, chain_name: &str, contract_key: &str) {
        info!("[{chain_name}] all randomness requests completed on {contract_key}");
    }
}
