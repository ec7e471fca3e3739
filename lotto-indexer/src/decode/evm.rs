// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! EVM log decoder. Logs are matched by topic0 against the typed event
//! structs below; `WinnerPicked` logs do not carry the winner wallet, so the
//! decoder issues the `getRoundResult` read-back to resolve it.

use async_trait::async_trait;
use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::types::{Address, U256};
use tracing::debug;

use crate::chain::evm::amount_i64;
use crate::chain::{ChainAdapter, EvmLogItem, RawChainItem};
use crate::error::{IndexerError, IndexerResult};
use crate::events::{
    EventKey, FirstTicketBonusAwarded, LotteryEvent, PrizeClaimed, TicketPurchased, WinnerPicked,
};

use super::EventDecoder;

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "TicketPurchased")]
pub struct TicketPurchasedLog {
    #[ethevent(indexed)]
    pub token: Address,
    #[ethevent(indexed)]
    pub buyer: Address,
    pub round_id: u32,
    pub count: u32,
    pub total_amount: U256,
    pub prize_amount: U256,
    pub commission_amount: U256,
    pub timestamp: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "FirstTicketBonusAwarded")]
pub struct FirstTicketBonusAwardedLog {
    #[ethevent(indexed)]
    pub token: Address,
    #[ethevent(indexed)]
    pub buyer: Address,
    pub round_id: u32,
    pub timestamp: U256,
    pub round_start_time: U256,
    pub round_end_time: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "WinnerPicked")]
pub struct WinnerPickedLog {
    #[ethevent(indexed)]
    pub token: Address,
    pub round_id: u32,
    pub winner_purchase_index: u32,
    pub winner_ticket_index: u32,
    pub prize_amount: U256,
    pub timestamp: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "PrizeClaimed")]
pub struct PrizeClaimedLog {
    #[ethevent(indexed)]
    pub token: Address,
    #[ethevent(indexed)]
    pub winner: Address,
    pub round_id: u32,
    pub timestamp: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "AllRequestsCompleted")]
pub struct AllRequestsCompletedLog {}

pub struct EvmEventDecoder;

fn timestamp_ms(seconds: U256) -> IndexerResult<i64> {
    amount_i64(seconds)?
        .checked_mul(1_000)
        .ok_or_else(|| IndexerError::DecodeError(format!("timestamp {seconds} overflows ms")))
}

impl EvmEventDecoder {
    fn event_key(adapter: &dyn ChainAdapter, item: &EvmLogItem) -> IndexerResult<EventKey> {
        let log = &item.log;
        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| IndexerError::DecodeError("log without transaction hash".to_string()))?;
        let log_index = log
            .log_index
            .ok_or_else(|| IndexerError::DecodeError("log without log index".to_string()))?;
        let block_number = log
            .block_number
            .ok_or_else(|| IndexerError::DecodeError("log without block number".to_string()))?;
        Ok(EventKey {
            chain_id: adapter.chain_id(),
            tx_hash: format!("{tx_hash:#x}"),
            index: u32::try_from(log_index.as_u64())
                .map_err(|_| IndexerError::DecodeError(format!("log index {log_index} too large")))?,
            block_position: block_number.as_u64(),
        })
    }
}

#[async_trait]
impl EventDecoder for EvmEventDecoder {
    async fn decode(
        &self,
        adapter: &dyn ChainAdapter,
        item: &RawChainItem,
    ) -> IndexerResult<Vec<LotteryEvent>> {
        let RawChainItem::EvmLog(item) = item else {
            return Err(IndexerError::InternalError(
                "evm decoder received a non-evm item".to_string(),
            ));
        };
        let Some(topic0) = item.log.topics.first().copied() else {
            return Ok(vec![]);
        };
        let raw = RawLog::from(item.log.clone());
        let key = Self::event_key(adapter, item)?;

        if topic0 == TicketPurchasedLog::signature() {
            let ev = TicketPurchasedLog::decode_log(&raw)
                .map_err(|e| IndexerError::DecodeError(format!("TicketPurchased: {e}")))?;
            Ok(vec![LotteryEvent::TicketPurchased(TicketPurchased {
                key,
                contract_key: item.contract.clone(),
                token: format!("{:#x}", ev.token),
                round_id: ev.round_id,
                buyer: format!("{:#x}", ev.buyer),
                count: ev.count,
                total_amount: amount_i64(ev.total_amount)?,
                prize_amount: amount_i64(ev.prize_amount)?,
                commission_amount: amount_i64(ev.commission_amount)?,
                timestamp_ms: timestamp_ms(ev.timestamp)?,
            })])
        } else if topic0 == FirstTicketBonusAwardedLog::signature() {
            let ev = FirstTicketBonusAwardedLog::decode_log(&raw)
                .map_err(|e| IndexerError::DecodeError(format!("FirstTicketBonusAwarded: {e}")))?;
            Ok(vec![LotteryEvent::FirstTicketBonus(FirstTicketBonusAwarded {
                key,
                contract_key: item.contract.clone(),
                token: format!("{:#x}", ev.token),
                round_id: ev.round_id,
                buyer: format!("{:#x}", ev.buyer),
                round_start_time_ms: timestamp_ms(ev.round_start_time)?,
                round_end_time_ms: timestamp_ms(ev.round_end_time)?,
                timestamp_ms: timestamp_ms(ev.timestamp)?,
            })])
        } else if topic0 == WinnerPickedLog::signature() {
            let ev = WinnerPickedLog::decode_log(&raw)
                .map_err(|e| IndexerError::DecodeError(format!("WinnerPicked: {e}")))?;
            let token = format!("{:#x}", ev.token);
            // The log carries indices only; the winner wallet and player set
            // come from the contract read-back.
            let result = adapter
                .round_result(&item.contract, &token, ev.round_id)
                .await?
                .ok_or_else(|| {
                    IndexerError::DecodeError(format!(
                        "round {} result not yet readable on {}",
                        ev.round_id, item.contract
                    ))
                })?;
            Ok(vec![LotteryEvent::WinnerPicked(WinnerPicked {
                key,
                contract_key: item.contract.clone(),
                token,
                round_id: ev.round_id,
                winner: result.winner,
                winner_purchase_index: ev.winner_purchase_index,
                winner_ticket_index: ev.winner_ticket_index,
                prize_amount: amount_i64(ev.prize_amount)?,
                players: result.players,
                timestamp_ms: timestamp_ms(ev.timestamp)?,
            })])
        } else if topic0 == PrizeClaimedLog::signature() {
            let ev = PrizeClaimedLog::decode_log(&raw)
                .map_err(|e| IndexerError::DecodeError(format!("PrizeClaimed: {e}")))?;
            Ok(vec![LotteryEvent::PrizeClaimed(PrizeClaimed {
                key,
                contract_key: item.contract.clone(),
                token: Some(format!("{:#x}", ev.token)),
                round_id: ev.round_id,
                winner: format!("{:#x}", ev.winner),
                timestamp_ms: timestamp_ms(ev.timestamp)?,
            })])
        } else if topic0 == AllRequestsCompletedLog::signature() {
            Ok(vec![LotteryEvent::AllRequestsCompleted {
                key,
                contract_key: item.contract.clone(),
            }])
        } else {
            // Not a lottery event; contracts emit plenty of others
            debug!(
                "[{}] skipping unrecognized topic {topic0:#x} in {}",
                adapter.chain_name(),
                key.tx_hash
            );
            Ok(vec![])
        }
    }
}
