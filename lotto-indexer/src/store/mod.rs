// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Storage seam for the applier and the cursor store.
//!
//! Each `apply_*` method persists one canonical event and its derived
//! aggregates as a single atomic unit. The natural key (tx_hash, index) is
//! the idempotency guard: re-applying an already persisted event returns
//! `Applied::Duplicate` and leaves every aggregate untouched.

use async_trait::async_trait;

use crate::error::IndexerResult;
use crate::events::{FirstTicketBonusAwarded, PrizeClaimed, TicketPurchased, WinnerPicked};

pub mod aggregates;
#[cfg(test)]
pub mod mem;
pub mod pg;

/// Outcome of applying one canonical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Duplicate,
}

/// Round row as seen by readers (operator API, tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSnapshot {
    pub token: String,
    pub round_id: u32,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub total_tickets: i64,
    pub prize_amount: i64,
    pub commission_amount: i64,
    pub winner_address: Option<String>,
    pub winner_ticket_index: Option<i64>,
    pub prize_claimed: bool,
}

/// Per-user, per-round stats row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticket_count: i32,
    pub is_consecutive: bool,
    pub consecutive_rounds: i32,
    pub total_wins: i32,
}

#[async_trait]
pub trait LottoStore: Send + Sync {
    // ---- sync cursors ----

    async fn cursor(&self, chain_name: &str, contract_key: &str) -> IndexerResult<Option<u64>>;

    /// Monotonic: callers never pass a lower value, and the store clamps
    /// with the stored position on upsert regardless.
    async fn set_cursor(
        &self,
        chain_name: &str,
        contract_key: &str,
        position: u64,
    ) -> IndexerResult<()>;

    // ---- canonical events ----

    async fn apply_ticket_purchase(&self, ev: &TicketPurchased) -> IndexerResult<Applied>;

    async fn apply_first_ticket_bonus(
        &self,
        ev: &FirstTicketBonusAwarded,
    ) -> IndexerResult<Applied>;

    async fn apply_winner_picked(&self, ev: &WinnerPicked) -> IndexerResult<Applied>;

    async fn apply_prize_claimed(&self, ev: &PrizeClaimed) -> IndexerResult<Applied>;

    // ---- read-backs ----

    async fn round(
        &self,
        chain_id: i64,
        contract_key: &str,
        token: &str,
        round_id: u32,
    ) -> IndexerResult<Option<RoundSnapshot>>;

    async fn round_stats(
        &self,
        address: &str,
        chain_id: i64,
        contract_key: &str,
        token: &str,
        round_id: u32,
    ) -> IndexerResult<Option<StatsSnapshot>>;
}
