// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Solana (Anchor) decoder. Instructions addressed to the lottery program are
//! matched by their 8-byte discriminator; the events themselves travel in
//! `Program data:` log lines, again discriminated by the first 8 bytes.
//! `WinnerPicked` does not carry the winner wallet: it is resolved from the
//! purchase account derived from (round, winner_purchase_index).

use std::io::{Cursor, Read};

use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::chain::{ChainAdapter, RawChainItem};
use crate::error::{IndexerError, IndexerResult};
use crate::events::{
    EventKey, FirstTicketBonusAwarded, LotteryEvent, PrizeClaimed, TicketPurchased, WinnerPicked,
};

use super::EventDecoder;

pub fn anchor_event_discriminator(name: &str) -> [u8; 8] {
    let preimage = format!("event:{name}");
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    let hash = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

pub fn anchor_instruction_discriminator(name: &str) -> [u8; 8] {
    let preimage = format!("global:{name}");
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    let hash = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

fn read_pubkey(cursor: &mut Cursor<&[u8]>) -> Result<Pubkey, std::io::Error> {
    let mut buf = [0u8; 32];
    cursor.read_exact(&mut buf)?;
    Ok(Pubkey::new_from_array(buf))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, std::io::Error> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, std::io::Error> {
    let mut buf = [0u8; 8];
    cursor.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64(cursor: &mut Cursor<&[u8]>) -> Result<i64, std::io::Error> {
    let mut buf = [0u8; 8];
    cursor.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, std::io::Error> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn lamports_i64(value: u64) -> IndexerResult<i64> {
    i64::try_from(value)
        .map_err(|_| IndexerError::DecodeError(format!("amount {value} overflows i64")))
}

fn secs_to_ms(secs: i64) -> IndexerResult<i64> {
    secs.checked_mul(1_000)
        .ok_or_else(|| IndexerError::DecodeError(format!("timestamp {secs} overflows ms")))
}

pub struct SolanaEventDecoder {
    disc_ticket_purchased: [u8; 8],
    disc_first_ticket_bonus: [u8; 8],
    disc_winner_picked: [u8; 8],
    disc_prize_claimed: [u8; 8],
    disc_status_changed: [u8; 8],
    disc_all_requests_completed: [u8; 8],
    known_instructions: Vec<([u8; 8], &'static str)>,
}

impl SolanaEventDecoder {
    pub fn new() -> Self {
        // Instruction names are only used for debug visibility; unknown
        // instructions are skipped without noise.
        let instruction_names = [
            "initialize_round",
            "buy_tickets",
            "request_randomness",
            "pick_winner",
            "claim_prize",
        ];
        Self {
            disc_ticket_purchased: anchor_event_discriminator("TicketPurchased"),
            disc_first_ticket_bonus: anchor_event_discriminator("FirstTicketBonusAwarded"),
            disc_winner_picked: anchor_event_discriminator("WinnerPicked"),
            disc_prize_claimed: anchor_event_discriminator("PrizeClaimed"),
            disc_status_changed: anchor_event_discriminator("StatusChanged"),
            disc_all_requests_completed: anchor_event_discriminator("AllRequestsCompleted"),
            known_instructions: instruction_names
                .iter()
                .map(|name| (anchor_instruction_discriminator(name), *name))
                .collect(),
        }
    }

    fn instruction_name(&self, data: &[u8]) -> Option<&'static str> {
        let disc = data.get(..8)?;
        self.known_instructions
            .iter()
            .find(|(known, _)| known == disc)
            .map(|(_, name)| *name)
    }
}

impl Default for SolanaEventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventDecoder for SolanaEventDecoder {
    async fn decode(
        &self,
        adapter: &dyn ChainAdapter,
        item: &RawChainItem,
    ) -> IndexerResult<Vec<LotteryEvent>> {
        let RawChainItem::SolanaTransaction(tx) = item else {
            return Err(IndexerError::InternalError(
                "solana decoder received a non-solana item".to_string(),
            ));
        };
        let chain_name = adapter.chain_name();
        // One program per Solana chain config; the program id is the contract key.
        let contract_key = adapter.cursor_key();

        for ix in &tx.instructions {
            match self.instruction_name(&ix.data) {
                Some(name) => debug!(
                    "[{chain_name}] {} instruction #{} in {}",
                    name, ix.index, tx.signature
                ),
                // Unknown instruction names are skipped silently
                None => {}
            }
        }

        let block_time_ms = tx.block_time.map(secs_to_ms).transpose()?.unwrap_or(0);
        let mut events = Vec::new();

        // Anchor events live in "Program data:" log lines. The ordinal of
        // the line within the transaction is the natural-key index; every
        // data line counts so the index stays stable across skips.
        //
        // A data line belongs to the innermost program invocation open at
        // that point. A foreign CPI program can emit an event with an
        // identical discriminator, so only lines inside the lottery
        // program's own invocation span are decoded.
        let mut invocations: Vec<&str> = Vec::new();
        let mut ordinal: u32 = 0;
        for line in &tx.log_messages {
            let encoded = match line.strip_prefix("Program data: ") {
                Some(encoded) => encoded,
                None => {
                    let Some(rest) = line.strip_prefix("Program ") else {
                        continue;
                    };
                    let mut parts = rest.splitn(2, ' ');
                    let (Some(id), Some(action)) = (parts.next(), parts.next()) else {
                        continue;
                    };
                    if action.starts_with("invoke") {
                        invocations.push(id);
                    } else if (action.starts_with("success") || action.starts_with("failed"))
                        && invocations.last().copied() == Some(id)
                    {
                        invocations.pop();
                    }
                    continue;
                }
            };
            let index = ordinal;
            ordinal += 1;
            if invocations.last().copied() != Some(contract_key.as_str()) {
                continue;
            }
            let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
                continue;
            };
            if bytes.len() < 8 {
                continue;
            }
            let (disc, payload) = bytes.split_at(8);
            let key = EventKey {
                chain_id: adapter.chain_id(),
                tx_hash: tx.signature.clone(),
                index,
                block_position: tx.slot,
            };
            let mut cursor = Cursor::new(payload);

            if disc == self.disc_ticket_purchased {
                let parsed = (|| -> Result<_, std::io::Error> {
                    let token = read_pubkey(&mut cursor)?;
                    let round_id = read_u32(&mut cursor)?;
                    let buyer = read_pubkey(&mut cursor)?;
                    let count = read_u32(&mut cursor)?;
                    let total_amount = read_u64(&mut cursor)?;
                    let prize_amount = read_u64(&mut cursor)?;
                    let commission_amount = read_u64(&mut cursor)?;
                    let timestamp = read_i64(&mut cursor)?;
                    Ok((
                        token,
                        round_id,
                        buyer,
                        count,
                        total_amount,
                        prize_amount,
                        commission_amount,
                        timestamp,
                    ))
                })();
                match parsed {
                    Ok((token, round_id, buyer, count, total, prize, commission, timestamp)) => {
                        events.push(LotteryEvent::TicketPurchased(TicketPurchased {
                            key,
                            contract_key: contract_key.clone(),
                            token: token.to_string(),
                            round_id,
                            buyer: buyer.to_string(),
                            count,
                            total_amount: lamports_i64(total)?,
                            prize_amount: lamports_i64(prize)?,
                            commission_amount: lamports_i64(commission)?,
                            timestamp_ms: secs_to_ms(timestamp)?,
                        }));
                    }
                    Err(e) => warn!(
                        "[{chain_name}] malformed TicketPurchased payload in {}: {e}",
                        tx.signature
                    ),
                }
            } else if disc == self.disc_first_ticket_bonus {
                let parsed = (|| -> Result<FirstTicketBonusAwarded, std::io::Error> {
                    let token = read_pubkey(&mut cursor)?;
                    let round_id = read_u32(&mut cursor)?;
                    let buyer = read_pubkey(&mut cursor)?;
                    let timestamp = read_i64(&mut cursor)?;
                    let round_start_time = read_i64(&mut cursor)?;
                    let round_end_time = read_i64(&mut cursor)?;
                    Ok(FirstTicketBonusAwarded {
                        key: key.clone(),
                        contract_key: contract_key.clone(),
                        token: token.to_string(),
                        round_id,
                        buyer: buyer.to_string(),
                        round_start_time_ms: round_start_time.saturating_mul(1_000),
                        round_end_time_ms: round_end_time.saturating_mul(1_000),
                        timestamp_ms: timestamp.saturating_mul(1_000),
                    })
                })();
                match parsed {
                    Ok(ev) => events.push(LotteryEvent::FirstTicketBonus(ev)),
                    Err(e) => warn!(
                        "[{chain_name}] malformed FirstTicketBonusAwarded payload in {}: {e}",
                        tx.signature
                    ),
                }
            } else if disc == self.disc_winner_picked {
                let parsed = (|| -> Result<_, std::io::Error> {
                    let token = read_pubkey(&mut cursor)?;
                    let round = read_pubkey(&mut cursor)?;
                    let round_id = read_u32(&mut cursor)?;
                    let winner_purchase_index = read_u32(&mut cursor)?;
                    let winner_ticket_index = read_u32(&mut cursor)?;
                    let prize_amount = read_u64(&mut cursor)?;
                    let timestamp = read_i64(&mut cursor)?;
                    Ok((
                        token,
                        round,
                        round_id,
                        winner_purchase_index,
                        winner_ticket_index,
                        prize_amount,
                        timestamp,
                    ))
                })();
                let (token, round, round_id, purchase_index, ticket_index, prize, timestamp) =
                    match parsed {
                        Ok(fields) => fields,
                        Err(e) => {
                            warn!(
                                "[{chain_name}] malformed WinnerPicked payload in {}: {e}",
                                tx.signature
                            );
                            continue;
                        }
                    };
                let winner = adapter
                    .purchase_owner(&round.to_string(), purchase_index)
                    .await?
                    .ok_or_else(|| {
                        IndexerError::DecodeError(format!(
                            "purchase account for round {round} index {purchase_index} not found"
                        ))
                    })?;
                events.push(LotteryEvent::WinnerPicked(WinnerPicked {
                    key,
                    contract_key: contract_key.clone(),
                    token: token.to_string(),
                    round_id,
                    winner,
                    winner_purchase_index: purchase_index,
                    winner_ticket_index: ticket_index,
                    prize_amount: lamports_i64(prize)?,
                    players: vec![],
                    timestamp_ms: secs_to_ms(timestamp)?,
                }));
            } else if disc == self.disc_prize_claimed {
                let parsed = (|| -> Result<_, std::io::Error> {
                    let round_id = read_u32(&mut cursor)?;
                    let winner = read_pubkey(&mut cursor)?;
                    Ok((round_id, winner))
                })();
                match parsed {
                    Ok((round_id, winner)) => {
                        events.push(LotteryEvent::PrizeClaimed(PrizeClaimed {
                            key,
                            contract_key: contract_key.clone(),
                            // The claim event does not name the token
                            token: None,
                            round_id,
                            winner: winner.to_string(),
                            timestamp_ms: block_time_ms,
                        }));
                    }
                    Err(e) => warn!(
                        "[{chain_name}] malformed PrizeClaimed payload in {}: {e}",
                        tx.signature
                    ),
                }
            } else if disc == self.disc_status_changed {
                // Decoded for visibility only; round status is tracked
                // through the other events.
                let parsed = (|| -> Result<_, std::io::Error> {
                    let round_id = read_u32(&mut cursor)?;
                    let old_status = read_u8(&mut cursor)?;
                    let new_status = read_u8(&mut cursor)?;
                    Ok((round_id, old_status, new_status))
                })();
                if let Ok((round_id, old_status, new_status)) = parsed {
                    info!(
                        "[{chain_name}] round {round_id} status {old_status} -> {new_status} in {}",
                        tx.signature
                    );
                }
            } else if disc == self.disc_all_requests_completed {
                events.push(LotteryEvent::AllRequestsCompleted {
                    key,
                    contract_key: contract_key.clone(),
                });
            }
            // Unknown discriminators are program events this indexer does
            // not track
        }

        Ok(events)
    }
}
