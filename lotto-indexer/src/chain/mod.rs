// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain adapters: one per connected chain, producing raw chain items for
//! the decoders. Exactly one adapter instance is live per chain at a time;
//! the supervisor tears an adapter down before creating its replacement.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ChainConfig, ChainKind};
use crate::error::IndexerResult;
use crate::events::RoundResult;

pub mod evm;
pub mod solana;
pub mod solana_rpc;

/// A raw, chain-specific item fetched from a height range. Decoding into
/// canonical events happens in `decode`.
#[derive(Debug, Clone)]
pub enum RawChainItem {
    EvmLog(EvmLogItem),
    SolanaTransaction(SolanaTxItem),
}

#[derive(Debug, Clone)]
pub struct EvmLogItem {
    /// Checksummed contract address the log was fetched for.
    pub contract: String,
    pub log: ethers::types::Log,
}

#[derive(Debug, Clone)]
pub struct SolanaTxItem {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Instructions (top-level and inner) addressed to the lottery program.
    pub instructions: Vec<SolanaInstructionItem>,
    pub log_messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SolanaInstructionItem {
    pub index: u32,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_name(&self) -> &str;

    fn chain_id(&self) -> i64;

    /// Key scoping the sync cursor for this adapter's contract set: the
    /// program id on Solana, the joined contract addresses on EVM.
    fn cursor_key(&self) -> String;

    /// Whether `fetch_items` returns newest-first pages (signature-history
    /// APIs do). The backfill engine reverses such batches before apply.
    fn history_newest_first(&self) -> bool {
        false
    }

    /// Latest block number / slot. Doubles as the liveness probe.
    async fn latest_height(&self) -> IndexerResult<u64>;

    /// All raw items for the configured contracts in `[from, to]` inclusive.
    async fn fetch_items(&self, from: u64, to: u64) -> IndexerResult<Vec<RawChainItem>>;

    /// Contract read-back for the full result of a completed round. Sources
    /// whose win events are self-contained return `None`.
    async fn round_result(
        &self,
        contract_key: &str,
        token: &str,
        round_id: u32,
    ) -> IndexerResult<Option<RoundResult>>;

    /// Owner wallet of the purchase account derived from (round, purchase
    /// index). Only meaningful for instruction-based sources.
    async fn purchase_owner(
        &self,
        round: &str,
        purchase_index: u32,
    ) -> IndexerResult<Option<String>> {
        let _ = (round, purchase_index);
        Ok(None)
    }
}

/// Creates fresh adapters for a chain. The supervisor goes through this on
/// every (re)connect so a failed adapter is never reused.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn create(&self) -> IndexerResult<Arc<dyn ChainAdapter>>;
}

pub struct ConfiguredAdapterFactory {
    config: ChainConfig,
}

impl ConfiguredAdapterFactory {
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AdapterFactory for ConfiguredAdapterFactory {
    async fn create(&self) -> IndexerResult<Arc<dyn ChainAdapter>> {
        match self.config.kind {
            ChainKind::Evm => Ok(Arc::new(evm::EvmAdapter::new(&self.config)?)),
            ChainKind::Solana => Ok(Arc::new(solana::SolanaAdapter::new(&self.config)?)),
        }
    }
}
