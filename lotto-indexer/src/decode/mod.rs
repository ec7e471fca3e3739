// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decoders from raw chain items to canonical lottery events.
//!
//! Decoders are pure translation plus, where a payload does not carry the
//! winner, the adapter read-backs (`round_result`, `purchase_owner`). They
//! never touch storage.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::{ChainAdapter, RawChainItem};
use crate::config::ChainKind;
use crate::error::IndexerResult;
use crate::events::LotteryEvent;

pub mod evm;
pub mod solana;

#[async_trait]
pub trait EventDecoder: Send + Sync {
    /// Canonical events carried by one raw item. Items that are not lottery
    /// events decode to an empty vec; malformed payloads are logged and
    /// skipped rather than failing the whole item.
    async fn decode(
        &self,
        adapter: &dyn ChainAdapter,
        item: &RawChainItem,
    ) -> IndexerResult<Vec<LotteryEvent>>;
}

pub fn decoder_for(kind: ChainKind) -> Arc<dyn EventDecoder> {
    match kind {
        ChainKind::Evm => Arc::new(evm::EvmEventDecoder),
        ChainKind::Solana => Arc::new(solana::SolanaEventDecoder::new()),
    }
}
