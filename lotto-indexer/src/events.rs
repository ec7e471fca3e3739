// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Canonical lottery events, the chain-independent output of the decoders.
//!
//! Every event is keyed by (tx_hash, index, block_position, chain_id): the
//! transaction hash plus the log index (EVM) or instruction index (Solana).
//! The key is the idempotency boundary for the applier.

/// Position of an event in the source chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub chain_id: i64,
    pub tx_hash: String,
    /// Log index (EVM) or instruction index (Solana) within the transaction scope.
    pub index: u32,
    /// Block number or slot.
    pub block_position: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketPurchased {
    pub key: EventKey,
    pub contract_key: String,
    pub token: String,
    pub round_id: u32,
    pub buyer: String,
    pub count: u32,
    pub total_amount: i64,
    /// Portion of `total_amount` feeding the round prize pool.
    pub prize_amount: i64,
    /// Portion of `total_amount` taken as commission.
    pub commission_amount: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstTicketBonusAwarded {
    pub key: EventKey,
    pub contract_key: String,
    pub token: String,
    pub round_id: u32,
    pub buyer: String,
    pub round_start_time_ms: i64,
    pub round_end_time_ms: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnerPicked {
    pub key: EventKey,
    pub contract_key: String,
    pub token: String,
    pub round_id: u32,
    /// Winner wallet, resolved by the decoder (read-back or derived account).
    pub winner: String,
    pub winner_purchase_index: u32,
    pub winner_ticket_index: u32,
    pub prize_amount: i64,
    /// Player set at win time when the source provides it; empty otherwise,
    /// in which case the applier falls back to the indexed round stats.
    pub players: Vec<String>,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeClaimed {
    pub key: EventKey,
    pub contract_key: String,
    /// Not all sources carry the token in the claim event.
    pub token: Option<String>,
    pub round_id: u32,
    pub winner: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LotteryEvent {
    TicketPurchased(TicketPurchased),
    FirstTicketBonus(FirstTicketBonusAwarded),
    WinnerPicked(WinnerPicked),
    PrizeClaimed(PrizeClaimed),
    /// Automation signal: every randomness request slot is consumed.
    AllRequestsCompleted { key: EventKey, contract_key: String },
}

impl LotteryEvent {
    pub fn key(&self) -> &EventKey {
        match self {
            LotteryEvent::TicketPurchased(e) => &e.key,
            LotteryEvent::FirstTicketBonus(e) => &e.key,
            LotteryEvent::WinnerPicked(e) => &e.key,
            LotteryEvent::PrizeClaimed(e) => &e.key,
            LotteryEvent::AllRequestsCompleted { key, .. } => key,
        }
    }

    pub fn contract_key(&self) -> &str {
        match self {
            LotteryEvent::TicketPurchased(e) => &e.contract_key,
            LotteryEvent::FirstTicketBonus(e) => &e.contract_key,
            LotteryEvent::WinnerPicked(e) => &e.contract_key,
            LotteryEvent::PrizeClaimed(e) => &e.contract_key,
            LotteryEvent::AllRequestsCompleted { contract_key, .. } => contract_key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LotteryEvent::TicketPurchased(_) => "ticket_purchased",
            LotteryEvent::FirstTicketBonus(_) => "first_ticket_bonus",
            LotteryEvent::WinnerPicked(_) => "winner_picked",
            LotteryEvent::PrizeClaimed(_) => "prize_claimed",
            LotteryEvent::AllRequestsCompleted { .. } => "all_requests_completed",
        }
    }
}

/// Full round result from the contract read-back, used where win logs do not
/// carry the winner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    pub completed: bool,
    pub winner: String,
    pub prize_amount: i64,
    pub winner_ticket_index: u32,
    pub players: Vec<String>,
}
