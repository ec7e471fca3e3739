// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Row models for the lottery store. `New*` structs are the insertable
//! halves of tables with serial keys.

use diesel::prelude::*;

use crate::schema::{
    first_ticket_bonuses, rounds, sync_cursors, ticket_purchases, user_round_stats, users,
    win_event_players, win_events,
};

/// Win event kinds persisted in `win_events.kind`.
pub const WIN_KIND_WINNER_PICKED: &str = "winner_picked";
pub const WIN_KIND_PRIZE_CLAIMED: &str = "prize_claimed";

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = sync_cursors)]
pub struct SyncCursor {
    pub chain_name: String,
    pub contract_key: String,
    pub last_position: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i64,
    pub address: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub address: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = rounds)]
pub struct Round {
    pub id: i64,
    pub chain_id: i64,
    pub contract_key: String,
    pub token: String,
    pub round_id: i64,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub total_tickets: i64,
    pub prize_amount: i64,
    pub commission_amount: i64,
    pub winner_address: Option<String>,
    pub winner_ticket_index: Option<i64>,
    pub prize_claimed: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = rounds)]
pub struct NewRound {
    pub chain_id: i64,
    pub contract_key: String,
    pub token: String,
    pub round_id: i64,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub total_tickets: i64,
    pub prize_amount: i64,
    pub commission_amount: i64,
    pub winner_address: Option<String>,
    pub winner_ticket_index: Option<i64>,
    pub prize_claimed: bool,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = ticket_purchases)]
pub struct TicketPurchase {
    pub id: i64,
    pub user_id: i64,
    pub chain_id: i64,
    pub contract_key: String,
    pub token: String,
    pub round_id: i64,
    pub ticket_count: i32,
    pub total_amount: i64,
    pub prize_amount: i64,
    pub commission_amount: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_position: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ticket_purchases)]
pub struct NewTicketPurchase {
    pub user_id: i64,
    pub chain_id: i64,
    pub contract_key: String,
    pub token: String,
    pub round_id: i64,
    pub ticket_count: i32,
    pub total_amount: i64,
    pub prize_amount: i64,
    pub commission_amount: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_position: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = first_ticket_bonuses)]
pub struct NewFirstTicketBonus {
    pub user_id: i64,
    pub chain_id: i64,
    pub contract_key: String,
    pub token: String,
    pub round_id: i64,
    pub round_start_time_ms: i64,
    pub round_end_time_ms: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_position: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = win_events)]
pub struct WinEvent {
    pub id: i64,
    pub user_id: i64,
    pub chain_id: i64,
    pub contract_key: String,
    pub token: String,
    pub round_id: i64,
    pub kind: String,
    pub prize_amount: i64,
    pub winner_ticket_index: Option<i64>,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_position: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = win_events)]
pub struct NewWinEvent {
    pub user_id: i64,
    pub chain_id: i64,
    pub contract_key: String,
    pub token: String,
    pub round_id: i64,
    pub kind: String,
    pub prize_amount: i64,
    pub winner_ticket_index: Option<i64>,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_position: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = win_event_players)]
pub struct NewWinEventPlayer {
    pub win_event_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = user_round_stats)]
pub struct UserRoundStats {
    pub id: i64,
    pub user_id: i64,
    pub chain_id: i64,
    pub contract_key: String,
    pub token: String,
    pub round_id: i64,
    pub ticket_count: i32,
    pub is_consecutive: bool,
    pub consecutive_rounds: i32,
    pub total_wins: i32,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_round_stats)]
pub struct NewUserRoundStats {
    pub user_id: i64,
    pub chain_id: i64,
    pub contract_key: String,
    pub token: String,
    pub round_id: i64,
    pub ticket_count: i32,
    pub is_consecutive: bool,
    pub consecutive_rounds: i32,
    pub total_wins: i32,
    pub updated_at_ms: i64,
}
