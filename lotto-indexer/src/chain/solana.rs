// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Solana chain adapter. The lottery program is an Anchor program: history
//! is walked through `getSignaturesForAddress` (newest first) and each
//! transaction's instructions and program logs are packaged for the decoder.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::config::ChainConfig;
use crate::error::{IndexerError, IndexerResult};
use crate::events::RoundResult;

use super::solana_rpc::SolanaRpcClient;
use super::{ChainAdapter, RawChainItem, SolanaInstructionItem, SolanaTxItem};

const SIGNATURE_PAGE_LIMIT: usize = 1_000;

/// Seed prefix of the per-purchase PDA holding the buyer wallet.
const PURCHASE_SEED: &[u8] = b"round_tickets_purchase";

pub struct SolanaAdapter {
    chain_name: String,
    chain_id: i64,
    rpc: SolanaRpcClient,
    program: Pubkey,
    program_str: String,
}

impl SolanaAdapter {
    pub fn new(config: &ChainConfig) -> IndexerResult<Self> {
        let program_str = config
            .contract_addresses
            .first()
            .cloned()
            .ok_or_else(|| IndexerError::ConfigError("missing program id".to_string()))?;
        let program = Pubkey::from_str(&program_str)
            .map_err(|e| IndexerError::ConfigError(format!("bad program id {program_str}: {e}")))?;
        Ok(Self {
            chain_name: config.chain_name.clone(),
            chain_id: config.chain_id,
            rpc: SolanaRpcClient::new(config.rpc_url.clone()),
            program,
            program_str,
        })
    }

    /// Extract the instructions addressed to the lottery program, walking
    /// top-level and inner instructions in execution order.
    fn parse_tx_item(&self, signature: &str, tx: &Value) -> Option<SolanaTxItem> {
        let slot = tx["slot"].as_u64()?;
        let block_time = tx["blockTime"].as_i64();
        let message = &tx["transaction"]["message"];
        let meta = &tx["meta"];

        // Failed transactions never emit events
        if !meta["err"].is_null() {
            return None;
        }

        let mut account_keys: Vec<String> = message["accountKeys"]
            .as_array()?
            .iter()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect();
        // v0 transactions append looked-up addresses after the static keys
        for group in ["writable", "readonly"] {
            if let Some(loaded) = meta["loadedAddresses"][group].as_array() {
                account_keys.extend(
                    loaded.iter().filter_map(|k| k.as_str().map(str::to_string)),
                );
            }
        }

        let mut instructions = Vec::new();
        let mut next_index = 0u32;
        let mut push_matching = |ix: &Value, instructions: &mut Vec<SolanaInstructionItem>| {
            let index = next_index;
            next_index += 1;
            let program_idx = ix["programIdIndex"].as_u64()? as usize;
            if account_keys.get(program_idx)? != &self.program_str {
                return None;
            }
            let data = bs58::decode(ix["data"].as_str()?).into_vec().ok()?;
            instructions.push(SolanaInstructionItem { index, data });
            Some(())
        };

        if let Some(top_level) = message["instructions"].as_array() {
            for ix in top_level {
                let _ = push_matching(ix, &mut instructions);
            }
        }
        if let Some(inner_groups) = meta["innerInstructions"].as_array() {
            for group in inner_groups {
                if let Some(inner) = group["instructions"].as_array() {
                    for ix in inner {
                        let _ = push_matching(ix, &mut instructions);
                    }
                }
            }
        }

        if instructions.is_empty() {
            return None;
        }

        let log_messages = meta["logMessages"]
            .as_array()
            .map(|logs| {
                logs.iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Some(SolanaTxItem {
            signature: signature.to_string(),
            slot,
            block_time,
            instructions,
            log_messages,
        })
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain_name(&self) -> &str {
        &self.chain_name
    }

    fn chain_id(&self) -> i64 {
        self.chain_id
    }

    fn cursor_key(&self) -> String {
        self.program_str.clone()
    }

    fn history_newest_first(&self) -> bool {
        true
    }

    async fn latest_height(&self) -> IndexerResult<u64> {
        self.rpc.get_slot().await
    }

    // Pages signature history until it falls below `from`. Returned items are
    // newest first, matching the RPC ordering; the backfill engine reverses.
    async fn fetch_items(&self, from: u64, to: u64) -> IndexerResult<Vec<RawChainItem>> {
        let mut items = Vec::new();
        let mut before: Option<String> = None;

        'paging: loop {
            let page = self
                .rpc
                .get_signatures_for_address(
                    &self.program_str,
                    before.as_deref(),
                    SIGNATURE_PAGE_LIMIT,
                )
                .await?;
            if page.is_empty() {
                break;
            }

            for info in &page {
                if info.slot < from {
                    break 'paging;
                }
                if info.slot > to || info.err.is_some() {
                    continue;
                }
                let Some(tx) = self.rpc.get_transaction(&info.signature).await? else {
                    debug!(
                        "[{}] transaction {} no longer available, skipping",
                        self.chain_name, info.signature
                    );
                    continue;
                };
                if let Some(item) = self.parse_tx_item(&info.signature, &tx) {
                    items.push(RawChainItem::SolanaTransaction(item));
                }
            }

            if page.len() < SIGNATURE_PAGE_LIMIT {
                break;
            }
            before = page.last().map(|info| info.signature.clone());
        }

        Ok(items)
    }

    async fn round_result(
        &self,
        _contract_key: &str,
        _token: &str,
        _round_id: u32,
    ) -> IndexerResult<Option<RoundResult>> {
        // Win events on this source carry everything but the winner wallet,
        // which comes from the derived purchase account instead.
        Ok(None)
    }

    async fn purchase_owner(
        &self,
        round: &str,
        purchase_index: u32,
    ) -> IndexerResult<Option<String>> {
        let round_key = Pubkey::from_str(round)
            .map_err(|e| IndexerError::DecodeError(format!("bad round pubkey {round}: {e}")))?;
        let (address, _bump) = Pubkey::find_program_address(
            &[
                PURCHASE_SEED,
                round_key.as_ref(),
                &purchase_index.to_le_bytes(),
            ],
            &self.program,
        );
        let Some(data) = self.rpc.get_account_data(&address.to_string()).await? else {
            return Ok(None);
        };
        // Purchase account layout: discriminator(8) + round(32) + player(32) + ...
        if data.len() < 72 {
            return Err(IndexerError::DecodeError(format!(
                "purchase account {address} too short: {} bytes",
                data.len()
            )));
        }
        let mut player = [0u8; 32];
        player.copy_from_slice(&data[40..72]);
        Ok(Some(Pubkey::new_from_array(player).to_string()))
    }
}
