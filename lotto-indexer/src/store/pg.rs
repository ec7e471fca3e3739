// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Postgres store. Every `apply_*` runs in one transaction so an event row
//! and its aggregates land (or roll back) together. Natural-key collisions
//! go through `ON CONFLICT DO NOTHING`; zero rows inserted is the Duplicate
//! outcome.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use lotto_pg_db::Db;
use lotto_schema::models::{
    NewFirstTicketBonus, NewRound, NewTicketPurchase, NewUser, NewUserRoundStats, NewWinEvent,
    NewWinEventPlayer, Round, SyncCursor, WIN_KIND_PRIZE_CLAIMED, WIN_KIND_WINNER_PICKED,
};
use lotto_schema::schema::{
    first_ticket_bonuses, rounds, sync_cursors, ticket_purchases, user_round_stats, users,
    win_event_players, win_events,
};

use crate::error::{IndexerError, IndexerResult};
use crate::events::{FirstTicketBonusAwarded, PrizeClaimed, TicketPurchased, WinnerPicked};

use super::aggregates::{streak_fields, PriorStats};
use super::{Applied, LottoStore, RoundSnapshot, StatsSnapshot};

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn connect(&self) -> IndexerResult<lotto_pg_db::Connection<'_>> {
        self.db
            .connect()
            .await
            .map_err(|e| IndexerError::StorageError(e.to_string()))
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

async fn get_or_create_user(
    conn: &mut AsyncPgConnection,
    address: &str,
    now: i64,
) -> IndexerResult<i64> {
    diesel::insert_into(users::table)
        .values(&NewUser {
            address: address.to_string(),
            created_at_ms: now,
        })
        .on_conflict(users::address)
        .do_nothing()
        .execute(conn)
        .await?;
    let id = users::table
        .filter(users::address.eq(address))
        .select(users::id)
        .first::<i64>(conn)
        .await?;
    Ok(id)
}

async fn prior_stats(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    chain_id: i64,
    contract_key: &str,
    token: &str,
    round_id: u32,
) -> IndexerResult<Option<PriorStats>> {
    let prior = user_round_stats::table
        .filter(user_round_stats::user_id.eq(user_id))
        .filter(user_round_stats::chain_id.eq(chain_id))
        .filter(user_round_stats::contract_key.eq(contract_key))
        .filter(user_round_stats::token.eq(token))
        .filter(user_round_stats::round_id.lt(round_id as i64))
        .order(user_round_stats::round_id.desc())
        .select((
            user_round_stats::round_id,
            user_round_stats::is_consecutive,
            user_round_stats::consecutive_rounds,
            user_round_stats::total_wins,
        ))
        .first::<(i64, bool, i32, i32)>(conn)
        .await
        .optional()?;
    Ok(prior.map(
        |(round_id, is_consecutive, consecutive_rounds, total_wins)| PriorStats {
            round_id: round_id as u32,
            is_consecutive,
            consecutive_rounds,
            total_wins,
        },
    ))
}

#[async_trait]
impl LottoStore for PgStore {
    async fn cursor(&self, chain_name: &str, contract_key: &str) -> IndexerResult<Option<u64>> {
        let mut conn = self.connect().await?;
        let position = sync_cursors::table
            .filter(sync_cursors::chain_name.eq(chain_name))
            .filter(sync_cursors::contract_key.eq(contract_key))
            .select(sync_cursors::last_position)
            .first::<i64>(&mut conn)
            .await
            .optional()?;
        Ok(position.map(|p| p as u64))
    }

    async fn set_cursor(
        &self,
        chain_name: &str,
        contract_key: &str,
        position: u64,
    ) -> IndexerResult<()> {
        let mut conn = self.connect().await?;
        diesel::insert_into(sync_cursors::table)
            .values(&SyncCursor {
                chain_name: chain_name.to_string(),
                contract_key: contract_key.to_string(),
                last_position: position as i64,
                updated_at_ms: now_ms(),
            })
            .on_conflict((sync_cursors::chain_name, sync_cursors::contract_key))
            .do_update()
            .set((
                // Clamp against concurrent writers; the cursor never moves back
                sync_cursors::last_position.eq(diesel::dsl::sql::<diesel::sql_types::BigInt>(
                    "GREATEST(sync_cursors.last_position, excluded.last_position)",
                )),
                sync_cursors::updated_at_ms.eq(now_ms()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn apply_ticket_purchase(&self, ev: &TicketPurchased) -> IndexerResult<Applied> {
        let mut conn = self.connect().await?;
        let now = now_ms();
        conn.transaction::<_, IndexerError, _>(|conn| {
            async move {
                let user_id = get_or_create_user(conn, &ev.buyer, now).await?;

                let inserted = diesel::insert_into(ticket_purchases::table)
                    .values(&NewTicketPurchase {
                        user_id,
                        chain_id: ev.key.chain_id,
                        contract_key: ev.contract_key.clone(),
                        token: ev.token.clone(),
                        round_id: ev.round_id as i64,
                        ticket_count: ev.count as i32,
                        total_amount: ev.total_amount,
                        prize_amount: ev.prize_amount,
                        commission_amount: ev.commission_amount,
                        tx_hash: ev.key.tx_hash.clone(),
                        log_index: ev.key.index as i64,
                        block_position: ev.key.block_position as i64,
                        timestamp_ms: ev.timestamp_ms,
                    })
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;
                if inserted == 0 {
                    return Ok(Applied::Duplicate);
                }

                // The round must already exist: it is created by the
                // first-ticket-bonus event that opens it.
                let updated = diesel::update(
                    rounds::table
                        .filter(rounds::chain_id.eq(ev.key.chain_id))
                        .filter(rounds::contract_key.eq(&ev.contract_key))
                        .filter(rounds::token.eq(&ev.token))
                        .filter(rounds::round_id.eq(ev.round_id as i64)),
                )
                .set((
                    rounds::prize_amount.eq(rounds::prize_amount + ev.prize_amount),
                    rounds::commission_amount
                        .eq(rounds::commission_amount + ev.commission_amount),
                    rounds::total_tickets.eq(rounds::total_tickets + ev.count as i64),
                ))
                .execute(conn)
                .await?;
                if updated == 0 {
                    return Err(IndexerError::RoundNotFound {
                        token: ev.token.clone(),
                        round_id: ev.round_id,
                    });
                }

                let bumped = diesel::update(
                    user_round_stats::table
                        .filter(user_round_stats::user_id.eq(user_id))
                        .filter(user_round_stats::chain_id.eq(ev.key.chain_id))
                        .filter(user_round_stats::contract_key.eq(&ev.contract_key))
                        .filter(user_round_stats::token.eq(&ev.token))
                        .filter(user_round_stats::round_id.eq(ev.round_id as i64)),
                )
                .set((
                    user_round_stats::ticket_count
                        .eq(user_round_stats::ticket_count + ev.count as i32),
                    user_round_stats::updated_at_ms.eq(now),
                ))
                .execute(conn)
                .await?;
                if bumped == 0 {
                    let prior = prior_stats(
                        conn,
                        user_id,
                        ev.key.chain_id,
                        &ev.contract_key,
                        &ev.token,
                        ev.round_id,
                    )
                    .await?;
                    let fields = streak_fields(prior.as_ref(), ev.round_id);
                    diesel::insert_into(user_round_stats::table)
                        .values(&NewUserRoundStats {
                            user_id,
                            chain_id: ev.key.chain_id,
                            contract_key: ev.contract_key.clone(),
                            token: ev.token.clone(),
                            round_id: ev.round_id as i64,
                            ticket_count: ev.count as i32,
                            is_consecutive: fields.is_consecutive,
                            consecutive_rounds: fields.consecutive_rounds,
                            total_wins: fields.total_wins,
                            updated_at_ms: now,
                        })
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                }

                Ok(Applied::Inserted)
            }
            .scope_boxed()
        })
        .await
    }

    async fn apply_first_ticket_bonus(
        &self,
        ev: &FirstTicketBonusAwarded,
    ) -> IndexerResult<Applied> {
        let mut conn = self.connect().await?;
        let now = now_ms();
        conn.transaction::<_, IndexerError, _>(|conn| {
            async move {
                let user_id = get_or_create_user(conn, &ev.buyer, now).await?;

                let inserted = diesel::insert_into(first_ticket_bonuses::table)
                    .values(&NewFirstTicketBonus {
                        user_id,
                        chain_id: ev.key.chain_id,
                        contract_key: ev.contract_key.clone(),
                        token: ev.token.clone(),
                        round_id: ev.round_id as i64,
                        round_start_time_ms: ev.round_start_time_ms,
                        round_end_time_ms: ev.round_end_time_ms,
                        tx_hash: ev.key.tx_hash.clone(),
                        log_index: ev.key.index as i64,
                        block_position: ev.key.block_position as i64,
                        timestamp_ms: ev.timestamp_ms,
                    })
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;
                if inserted == 0 {
                    return Ok(Applied::Duplicate);
                }

                // The bonus is emitted by the purchase that opens the round,
                // so this is where the round row is born.
                diesel::insert_into(rounds::table)
                    .values(&NewRound {
                        chain_id: ev.key.chain_id,
                        contract_key: ev.contract_key.clone(),
                        token: ev.token.clone(),
                        round_id: ev.round_id as i64,
                        start_time_ms: ev.round_start_time_ms,
                        end_time_ms: ev.round_end_time_ms,
                        total_tickets: 0,
                        prize_amount: 0,
                        commission_amount: 0,
                        winner_address: None,
                        winner_ticket_index: None,
                        prize_claimed: false,
                    })
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;

                Ok(Applied::Inserted)
            }
            .scope_boxed()
        })
        .await
    }

    async fn apply_winner_picked(&self, ev: &WinnerPicked) -> IndexerResult<Applied> {
        let mut conn = self.connect().await?;
        let now = now_ms();
        conn.transaction::<_, IndexerError, _>(|conn| {
            async move {
                let winner_id = get_or_create_user(conn, &ev.winner, now).await?;

                let win_id: Option<i64> = diesel::insert_into(win_events::table)
                    .values(&NewWinEvent {
                        user_id: winner_id,
                        chain_id: ev.key.chain_id,
                        contract_key: ev.contract_key.clone(),
                        token: ev.token.clone(),
                        round_id: ev.round_id as i64,
                        kind: WIN_KIND_WINNER_PICKED.to_string(),
                        prize_amount: ev.prize_amount,
                        winner_ticket_index: Some(ev.winner_ticket_index as i64),
                        tx_hash: ev.key.tx_hash.clone(),
                        log_index: ev.key.index as i64,
                        block_position: ev.key.block_position as i64,
                        timestamp_ms: ev.timestamp_ms,
                    })
                    .on_conflict_do_nothing()
                    .returning(win_events::id)
                    .get_result(conn)
                    .await
                    .optional()?;
                let Some(win_id) = win_id else {
                    return Ok(Applied::Duplicate);
                };

                // Player set at win time: from the event when the source
                // provides it, otherwise from the stats rows we indexed.
                let player_addresses = if ev.players.is_empty() {
                    user_round_stats::table
                        .inner_join(users::table)
                        .filter(user_round_stats::chain_id.eq(ev.key.chain_id))
                        .filter(user_round_stats::contract_key.eq(&ev.contract_key))
                        .filter(user_round_stats::token.eq(&ev.token))
                        .filter(user_round_stats::round_id.eq(ev.round_id as i64))
                        .select(users::address)
                        .load::<String>(conn)
                        .await?
                } else {
                    ev.players.clone()
                };
                for address in &player_addresses {
                    let user_id = get_or_create_user(conn, address, now).await?;
                    diesel::insert_into(win_event_players::table)
                        .values(&NewWinEventPlayer { win_event_id: win_id, user_id })
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                }

                let updated = diesel::update(
                    rounds::table
                        .filter(rounds::chain_id.eq(ev.key.chain_id))
                        .filter(rounds::contract_key.eq(&ev.contract_key))
                        .filter(rounds::token.eq(&ev.token))
                        .filter(rounds::round_id.eq(ev.round_id as i64)),
                )
                .set((
                    rounds::winner_address.eq(Some(ev.winner.clone())),
                    rounds::winner_ticket_index.eq(Some(ev.winner_ticket_index as i64)),
                ))
                .execute(conn)
                .await?;
                if updated == 0 {
                    return Err(IndexerError::RoundNotFound {
                        token: ev.token.clone(),
                        round_id: ev.round_id,
                    });
                }

                let bumped = diesel::update(
                    user_round_stats::table
                        .filter(user_round_stats::user_id.eq(winner_id))
                        .filter(user_round_stats::chain_id.eq(ev.key.chain_id))
                        .filter(user_round_stats::contract_key.eq(&ev.contract_key))
                        .filter(user_round_stats::token.eq(&ev.token))
                        .filter(user_round_stats::round_id.eq(ev.round_id as i64)),
                )
                .set((
                    user_round_stats::total_wins.eq(user_round_stats::total_wins + 1),
                    user_round_stats::updated_at_ms.eq(now),
                ))
                .execute(conn)
                .await?;
                if bumped == 0 {
                    // Winner without an indexed purchase (partial history);
                    // record the win on a fresh stats row.
                    let prior = prior_stats(
                        conn,
                        winner_id,
                        ev.key.chain_id,
                        &ev.contract_key,
                        &ev.token,
                        ev.round_id,
                    )
                    .await?;
                    let fields = streak_fields(prior.as_ref(), ev.round_id);
                    diesel::insert_into(user_round_stats::table)
                        .values(&NewUserRoundStats {
                            user_id: winner_id,
                            chain_id: ev.key.chain_id,
                            contract_key: ev.contract_key.clone(),
                            token: ev.token.clone(),
                            round_id: ev.round_id as i64,
                            ticket_count: 0,
                            is_consecutive: fields.is_consecutive,
                            consecutive_rounds: fields.consecutive_rounds,
                            total_wins: fields.total_wins + 1,
                            updated_at_ms: now,
                        })
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                }

                Ok(Applied::Inserted)
            }
            .scope_boxed()
        })
        .await
    }

    async fn apply_prize_claimed(&self, ev: &PrizeClaimed) -> IndexerResult<Applied> {
        let mut conn = self.connect().await?;
        let now = now_ms();
        conn.transaction::<_, IndexerError, _>(|conn| {
            async move {
                let winner_id = get_or_create_user(conn, &ev.winner, now).await?;

                let inserted = diesel::insert_into(win_events::table)
                    .values(&NewWinEvent {
                        user_id: winner_id,
                        chain_id: ev.key.chain_id,
                        contract_key: ev.contract_key.clone(),
                        token: ev.token.clone().unwrap_or_default(),
                        round_id: ev.round_id as i64,
                        kind: WIN_KIND_PRIZE_CLAIMED.to_string(),
                        prize_amount: 0,
                        winner_ticket_index: None,
                        tx_hash: ev.key.tx_hash.clone(),
                        log_index: ev.key.index as i64,
                        block_position: ev.key.block_position as i64,
                        timestamp_ms: ev.timestamp_ms,
                    })
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;
                if inserted == 0 {
                    return Ok(Applied::Duplicate);
                }

                let updated = match &ev.token {
                    Some(token) => {
                        diesel::update(
                            rounds::table
                                .filter(rounds::chain_id.eq(ev.key.chain_id))
                                .filter(rounds::contract_key.eq(&ev.contract_key))
                                .filter(rounds::token.eq(token))
                                .filter(rounds::round_id.eq(ev.round_id as i64)),
                        )
                        .set(rounds::prize_claimed.eq(true))
                        .execute(conn)
                        .await?
                    }
                    // Claim events without a token address the round by id
                    // alone; round ids are unique per contract.
                    None => {
                        diesel::update(
                            rounds::table
                                .filter(rounds::chain_id.eq(ev.key.chain_id))
                                .filter(rounds::contract_key.eq(&ev.contract_key))
                                .filter(rounds::round_id.eq(ev.round_id as i64)),
                        )
                        .set(rounds::prize_claimed.eq(true))
                        .execute(conn)
                        .await?
                    }
                };
                if updated == 0 {
                    return Err(IndexerError::RoundNotFound {
                        token: ev.token.clone().unwrap_or_default(),
                        round_id: ev.round_id,
                    });
                }

                Ok(Applied::Inserted)
            }
            .scope_boxed()
        })
        .await
    }

    async fn round(
        &self,
        chain_id: i64,
        contract_key: &str,
        token: &str,
        round_id: u32,
    ) -> IndexerResult<Option<RoundSnapshot>> {
        let mut conn = self.connect().await?;
        let row = rounds::table
            .filter(rounds::chain_id.eq(chain_id))
            .filter(rounds::contract_key.eq(contract_key))
            .filter(rounds::token.eq(token))
            .filter(rounds::round_id.eq(round_id as i64))
            .first::<Round>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(|r| RoundSnapshot {
            token: r.token,
            round_id: r.round_id as u32,
            start_time_ms: r.start_time_ms,
            end_time_ms: r.end_time_ms,
            total_tickets: r.total_tickets,
            prize_amount: r.prize_amount,
            commission_amount: r.commission_amount,
            winner_address: r.winner_address,
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
        let mut conn = self.connect().await?;
        let row = user_round_stats::table
            .inner_join(users::table)
            .filter(users::address.eq(address))
            .filter(user_round_stats::chain_id.eq(chain_id))
            .filter(user_round_stats::contract_key.eq(contract_key))
            .filter(user_round_stats::token.eq(token))
            .filter(user_round_stats::round_id.eq(round_id as i64))
            .select((
                user_round_stats::ticket_count,
                user_round_stats::is_consecutive,
                user_round_stats::consecutive_rounds,
                user_round_stats::total_wins,
            ))
            .first::<(i32, bool, i32, i32)>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(
            |(ticket_count, is_consecutive, consecutive_rounds, total_wins)| StatsSnapshot {
                ticket_count,
                is_consecutive,
                consecutive_rounds,
                total_wins,
            },
        ))
    }
}
