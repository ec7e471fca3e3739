// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory store used by tests. Mirrors the Postgres semantics: natural
//! keys, round accumulation, streak computation on stats-row creation.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{IndexerError, IndexerResult};
use crate::events::{FirstTicketBonusAwarded, PrizeClaimed, TicketPurchased, WinnerPicked};

use super::aggregates::{streak_fields, PriorStats};
use super::{Applied, LottoStore, RoundSnapshot, StatsSnapshot};

type NaturalKey = (String, u32);
type RoundKey = (i64, String, String, u32);
type StatsKey = (String, i64, String, String, u32);

#[derive(Debug, Clone, Default)]
struct RoundRow {
    start_time_ms: i64,
    end_time_ms: i64,
    total_tickets: i64,
    prize_amount: i64,
    commission_amount: i64,
    winner_address: Option<String>,
    winner_ticket_index: Option<i64>,
    prize_claimed: bool,
}

#[derive(Debug, Clone, Default)]
struct StatsRow {
    ticket_count: i32,
    is_consecutive: bool,
    consecutive_rounds: i32,
    total_wins: i32,
}

#[derive(Default)]
struct Inner {
    cursors: HashMap<(String, String), u64>,
    purchases: HashSet<NaturalKey>,
    bonuses: HashSet<NaturalKey>,
    wins: HashSet<NaturalKey>,
    rounds: HashMap<RoundKey, RoundRow>,
    stats: HashMap<StatsKey, StatsRow>,
    win_players: HashMap<NaturalKey, Vec<String>>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
    fail_next: Mutex<Option<IndexerError>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next apply call fail with `error`, simulating an outage.
    pub fn fail_next(&self, error: IndexerError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    fn take_failure(&self) -> Option<IndexerError> {
        self.fail_next.lock().unwrap().take()
    }

    pub fn win_players(&self, tx_hash: &str, index: u32) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .win_players
            .get(&(tx_hash.to_string(), index))
            .cloned()
            .unwrap_or_default()
    }

    fn prior_stats(
        inner: &Inner,
        address: &str,
        chain_id: i64,
        contract_key: &str,
        token: &str,
        round_id: u32,
    ) -> Option<PriorStats> {
        inner
            .stats
            .iter()
            .filter(|((a, c, k, t, r), _)| {
                a == address && *c == chain_id && k == contract_key && t == token && *r < round_id
            })
            .max_by_key(|((_, _, _, _, r), _)| *r)
            .map(|((_, _, _, _, r), row)| PriorStats {
                round_id: *r,
                is_consecutive: row.is_consecutive,
                consecutive_rounds: row.consecutive_rounds,
                total_wins: row.total_wins,
            })
    }
}

#[async_trait]
impl LottoStore for MemStore {
    async fn cursor(&self, chain_name: &str, contract_key: &str) -> IndexerResult<Option<u64>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .cursors
            .get(&(chain_name.to_string(), contract_key.to_string()))
            .copied())
    }

    async fn set_cursor(
        &self,
        chain_name: &str,
        contract_key: &str,
        position: u64,
    ) -> IndexerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .cursors
            .entry((chain_name.to_string(), contract_key.to_string()))
            .or_insert(0);
        *entry = (*entry).max(position);
        Ok(())
    }

    async fn apply_ticket_purchase(&self, ev: &TicketPurchased) -> IndexerResult<Applied> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let mut inner = self.inner.lock().unwrap();
        let natural_key = (ev.key.tx_hash.clone(), ev.key.index);
        if inner.purchases.contains(&natural_key) {
            return Ok(Applied::Duplicate);
        }

        let round_key = (
            ev.key.chain_id,
            ev.contract_key.clone(),
            ev.token.clone(),
            ev.round_id,
        );
        if !inner.rounds.contains_key(&round_key) {
            return Err(IndexerError::RoundNotFound {
                token: ev.token.clone(),
                round_id: ev.round_id,
            });
        }

        inner.purchases.insert(natural_key);
        let round = inner.rounds.get_mut(&round_key).unwrap();
        round.prize_amount += ev.prize_amount;
        round.commission_amount += ev.commission_amount;
        round.total_tickets += ev.count as i64;

        let stats_key = (
            ev.buyer.clone(),
            ev.key.chain_id,
            ev.contract_key.clone(),
            ev.token.clone(),
            ev.round_id,
        );
        if let Some(row) = inner.stats.get_mut(&stats_key) {
            row.ticket_count += ev.count as i32;
        } else {
            let prior = Self::prior_stats(
                &inner,
                &ev.buyer,
                ev.key.chain_id,
                &ev.contract_key,
                &ev.token,
                ev.round_id,
            );
            let fields = streak_fields(prior.as_ref(), ev.round_id);
            inner.stats.insert(
                stats_key,
                StatsRow {
                    ticket_count: ev.count as i32,
                    is_consecutive: fields.is_consecutive,
                    consecutive_rounds: fields.consecutive_rounds,
                    total_wins: fields.total_wins,
                },
            );
        }

        Ok(Applied::Inserted)
    }

    async fn apply_first_ticket_bonus(
        &self,
        ev: &FirstTicketBonusAwarded,
    ) -> IndexerResult<Applied> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let mut inner = self.inner.lock().unwrap();
        let natural_key = (ev.key.tx_hash.clone(), ev.key.index);
        if inner.bonuses.contains(&natural_key) {
            return Ok(Applied::Duplicate);
        }
        inner.bonuses.insert(natural_key);

        let round_key = (
            ev.key.chain_id,
            ev.contract_key.clone(),
            ev.token.clone(),
            ev.round_id,
        );
        inner.rounds.entry(round_key).or_insert(RoundRow {
            start_time_ms: ev.round_start_time_ms,
            end_time_ms: ev.round_end_time_ms,
            ..Default::default()
        });

        Ok(Applied::Inserted)
    }

    async fn apply_winner_picked(&self, ev: &WinnerPicked) -> IndexerResult<Applied> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let mut inner = self.inner.lock().unwrap();
        let natural_key = (ev.key.tx_hash.clone(), ev.key.index);
        if inner.wins.contains(&natural_key) {
            return Ok(Applied::Duplicate);
        }

        let round_key = (
            ev.key.chain_id,
            ev.contract_key.clone(),
            ev.token.clone(),
            ev.round_id,
        );
        if !inner.rounds.contains_key(&round_key) {
            return Err(IndexerError::RoundNotFound {
                token: ev.token.clone(),
                round_id: ev.round_id,
            });
        }

        inner.wins.insert(natural_key.clone());
        let players = if ev.players.is_empty() {
            inner
                .stats
                .iter()
                .filter(|((_, c, k, t, r), _)| {
                    *c == ev.key.chain_id
                        && k == &ev.contract_key
                        && t == &ev.token
                        && *r == ev.round_id
                })
                .map(|((a, _, _, _, _), _)| a.clone())
                .collect()
        } else {
            ev.players.clone()
        };
        inner.win_players.insert(natural_key, players);

        let round = inner.rounds.get_mut(&round_key).unwrap();
        round.winner_address = Some(ev.winner.clone());
        round.winner_ticket_index = Some(ev.winner_ticket_index as i64);

        let stats_key = (
            ev.winner.clone(),
            ev.key.chain_id,
            ev.contract_key.clone(),
            ev.token.clone(),
            ev.round_id,
        );
        match inner.stats.get_mut(&stats_key) {
            Some(row) => row.total_wins += 1,
            None => {
                let prior = Self::prior_stats(
                    &inner,
                    &ev.winner,
                    ev.key.chain_id,
                    &ev.contract_key,
                    &ev.token,
                    ev.round_id,
                );
                let fields = streak_fields(prior.as_ref(), ev.round_id);
                inner.stats.insert(
                    stats_key,
                    StatsRow {
                        ticket_count: 0,
                        is_consecutive: fields.is_consecutive,
                        consecutive_rounds: fields.consecutive_rounds,
                        total_wins: fields.total_wins + 1,
                    },
                );
            }
        }

        Ok(Applied::Inserted)
    }

    async fn apply_prize_claimed(&self, ev: &PrizeClaimed) -> IndexerResult<Applied> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let mut inner = self.inner.lock().unwrap();
        let natural_key = (ev.key.tx_hash.clone(), ev.key.index);
        if inner.wins.contains(&natural_key) {
            return Ok(Applied::Duplicate);
        }

        // A failed claim must not leave the natural key behind, so resolve
        // the round before marking the event seen.
        let round = inner
            .rounds
            .iter_mut()
            .find(|((c, k, t, r), _)| {
                *c == ev.key.chain_id
                    && k == &ev.contract_key
                    && *r == ev.round_id
                    && ev.token.as_ref().map_or(true, |token| t == token)
            })
            .map(|(_, row)| row);
        match round {
            Some(row) => row.prize_claimed = true,
            None => {
                return Err(IndexerError::RoundNotFound {
                    token: ev.token.clone().unwrap_or_default(),
                    round_id: ev.round_id,
                })
            }
        }
        inner.wins.insert(natural_key);

        Ok(Applied::Inserted)
    }

    async fn round(
        &self,
        chain_id: i64,
        contract_key: &str,
        token: &str,
        round_id: u32,
    ) -> IndexerResult<Option<RoundSnapshot>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rounds
            .get(&(
                chain_id,
                contract_key.to_string(),
                token.to_string(),
                round_id,
            ))
            .map(|r| RoundSnapshot {
                token: token.to_string(),
                round_id,
                start_time_ms: r.start_time_ms,
                end_time_ms: r.end_time_ms,
                total_tickets: r.total_tickets,
                prize_amount: r.prize_amount,
                commission_amount: r.commission_amount,
                winner_address: r.winner_address.clone(),
                winner_ticket_index: r.winner_ticket_index,
                prize_claimed: r.prize_claimed,
            }))
    }

    async fn round_stats(
        &self,
        address: &str,
        chain_id: i64,
        contract_key: &str,
        token: &str,
        round_id: u32,
    ) -> IndexerResult<Option<StatsSnapshot>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .stats
            .get(&(
                address.to_string(),
                chain_id,
                contract_key.to_string(),
                token.to_string(),
                round_id,
            ))
            .map(|row| StatsSnapshot {
                ticket_count: row.ticket_count,
                is_consecutive: row.is_consecutive,
                consecutive_rounds: row.consecutive_rounds,
                total_wins: row.total_wins,
            }))
    }
}
