// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! EVM chain adapter over an `ethers` HTTP provider. Lottery events arrive
//! as logs from the configured contracts; the round result read-back goes
//! through `getRoundResult` on the emitting contract.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::contract::Contract;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address as EthAddress, Filter, U256};

use crate::config::ChainConfig;
use crate::error::{IndexerError, IndexerResult};
use crate::events::RoundResult;

use super::{ChainAdapter, EvmLogItem, RawChainItem};

const ROUND_RESULT_ABI: &str = "function getRoundResult(address token, uint32 roundId) view returns (bool completed, address winner, uint256 prizeAmount, uint32 winnerTicketIndex, address[] players)";

pub struct EvmAdapter {
    chain_name: String,
    chain_id: i64,
    provider: Arc<Provider<Http>>,
    contracts: Vec<EthAddress>,
    read_abi: Abi,
}

impl EvmAdapter {
    pub fn new(config: &ChainConfig) -> IndexerResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| IndexerError::ConfigError(format!("bad rpc url: {e}")))?;
        let contracts = config
            .contract_addresses
            .iter()
            .map(|addr| {
                EthAddress::from_str(addr).map_err(|e| {
                    IndexerError::ConfigError(format!("bad contract address {addr}: {e}"))
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;
        let read_abi = ethers::abi::parse_abi(&[ROUND_RESULT_ABI])
            .map_err(|e| IndexerError::InternalError(format!("bad read-back abi: {e}")))?;
        Ok(Self {
            chain_name: config.chain_name.clone(),
            chain_id: config.chain_id,
            provider: Arc::new(provider),
            contracts,
            read_abi,
        })
    }
}

pub(crate) fn amount_i64(value: U256) -> IndexerResult<i64> {
    let v = u64::try_from(value)
        .map_err(|_| IndexerError::DecodeError(format!("amount {value} overflows u64")))?;
    i64::try_from(v).map_err(|_| IndexerError::DecodeError(format!("amount {value} overflows i64")))
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain_name(&self) -> &str {
        &self.chain_name
    }

    fn chain_id(&self) -> i64 {
        self.chain_id
    }

    fn cursor_key(&self) -> String {
        self.contracts
            .iter()
            .map(|c| format!("{c:#x}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn latest_height(&self) -> IndexerResult<u64> {
        let block = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| IndexerError::from_rpc_message(e.to_string()))?;
        Ok(block.as_u64())
    }

    // Note: query may fail if the range is too big. Callsite is responsible
    // for chunking the query.
    async fn fetch_items(&self, from: u64, to: u64) -> IndexerResult<Vec<RawChainItem>> {
        let mut items = Vec::new();
        for contract in &self.contracts {
            let filter = Filter::new()
                .from_block(from)
                .to_block(to)
                .address(*contract);
            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| IndexerError::from_rpc_message(e.to_string()))?;
            // Safeguard: the provider must only return logs for the requested contract
            if logs.iter().any(|log| log.address != *contract) {
                return Err(IndexerError::RpcError(format!(
                    "provider returned logs from a different contract (expected {contract:?})"
                )));
            }
            let contract_key = format!("{contract:#x}");
            items.extend(logs.into_iter().map(|log| {
                RawChainItem::EvmLog(EvmLogItem {
                    contract: contract_key.clone(),
                    log,
                })
            }));
        }
        Ok(items)
    }

    async fn round_result(
        &self,
        contract_key: &str,
        token: &str,
        round_id: u32,
    ) -> IndexerResult<Option<RoundResult>> {
        let contract_addr = EthAddress::from_str(contract_key)
            .map_err(|e| IndexerError::InternalError(format!("bad contract key: {e}")))?;
        let token_addr = EthAddress::from_str(token)
            .map_err(|e| IndexerError::DecodeError(format!("bad token address {token}: {e}")))?;
        let contract = Contract::new(contract_addr, self.read_abi.clone(), self.provider.clone());
        let (completed, winner, prize_amount, winner_ticket_index, players): (
            bool,
            EthAddress,
            U256,
            u32,
            Vec<EthAddress>,
        ) = contract
            .method("getRoundResult", (token_addr, round_id))
            .map_err(|e| IndexerError::InternalError(format!("bad read-back call: {e}")))?
            .call()
            .await
            .map_err(|e| IndexerError::from_rpc_message(e.to_string()))?;
        if !completed {
            return Ok(None);
        }
        Ok(Some(RoundResult {
            completed,
            winner: format!("{winner:#x}"),
            prize_amount: amount_i64(prize_amount)?,
            winner_ticket_index,
            players: players.iter().map(|p| format!("{p:#x}")).collect(),
        }))
    }
}
