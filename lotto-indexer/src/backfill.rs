// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Range backfill: replays historical chain items through the decoder and
//! applier in bounded chunks, persisting the sync cursor after each chunk so
//! an interrupted run resumes where it stopped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::applier::EventApplier;
use crate::chain::ChainAdapter;
use crate::decode::EventDecoder;
use crate::error::{IndexerError, IndexerResult};
use crate::metrics::IndexerMetrics;

const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Splits `[from, to]` (inclusive) into ascending chunks of at most
/// `max_chunk_size` positions.
pub fn split_chunks(from: u64, to: u64, max_chunk_size: u64) -> Vec<(u64, u64)> {
    let mut chunks = Vec::new();
    if from > to || max_chunk_size == 0 {
        return chunks;
    }
    let mut start = from;
    while start <= to {
        let end = to.min(start.saturating_add(max_chunk_size - 1));
        chunks.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    chunks
}

pub struct BackfillEngine {
    chain_name: String,
    applier: Arc<EventApplier>,
    decoder: Arc<dyn EventDecoder>,
    max_chunk_size: u64,
    rate_limit_max_retries: u32,
    metrics: Arc<IndexerMetrics>,
}

impl BackfillEngine {
    pub fn new(
        chain_name: impl Into<String>,
        applier: Arc<EventApplier>,
        decoder: Arc<dyn EventDecoder>,
        max_chunk_size: u64,
        rate_limit_max_retries: u32,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        Self {
            chain_name: chain_name.into(),
            applier,
            decoder,
            max_chunk_size,
            rate_limit_max_retries,
            metrics,
        }
    }

    /// Replays `[from, to]` inclusive. Returns true when every chunk was
    /// processed and the cursor reached `to`; false on the first chunk that
    /// could not be completed (the cursor then points at the last good chunk).
    pub async fn backfill(&self, adapter: &dyn ChainAdapter, from: u64, to: u64) -> bool {
        if from > to {
            return true;
        }
        let chunks = split_chunks(from, to, self.max_chunk_size);
        info!(
            "[{}] backfilling [{from}, {to}] in {} chunk(s)",
            self.chain_name,
            chunks.len()
        );
        for (start, end) in chunks {
            if let Err(e) = self.process_chunk(adapter, start, end).await {
                error!(
                    "[{}] backfill aborted in chunk [{start}, {end}]: {e:?}",
                    self.chain_name
                );
                return false;
            }
            if let Err(e) = self
                .applier
                .store()
                .set_cursor(&self.chain_name, &adapter.cursor_key(), end)
                .await
            {
                error!(
                    "[{}] failed to persist cursor at {end}: {e:?}",
                    self.chain_name
                );
                return false;
            }
            self.metrics
                .backfill_chunks
                .with_label_values(&[&self.chain_name])
                .inc();
            self.metrics
                .last_processed_position
                .with_label_values(&[&self.chain_name])
                .set(end as i64);
        }
        true
    }

    async fn process_chunk(
        &self,
        adapter: &dyn ChainAdapter,
        start: u64,
        end: u64,
    ) -> IndexerResult<()> {
        let mut items = self.fetch_chunk(adapter, start, end).await?;
        if adapter.history_newest_first() {
            // Signature-history sources page newest-first; rounds must be
            // created before their purchases, so apply oldest-first.
            items.reverse();
        }
        for item in &items {
            let events = match self.decoder.decode(adapter, item).await {
                Ok(events) => events,
                Err(e @ IndexerError::DecodeError(_)) => {
                    warn!("[{}] skipping undecodable item: {e:?}", self.chain_name);
                    self.metrics
                        .events_failed
                        .with_label_values(&[&self.chain_name, e.error_type()])
                        .inc();
                    continue;
                }
                Err(e) => return Err(e),
            };
            for ev in events {
                match self.applier.apply(&ev).await {
                    Ok(_) => {}
                    Err(e @ IndexerError::RoundNotFound { .. }) => {
                        // Out-of-band event for a round this indexer never saw
                        // open. Skippable; everything else aborts the chunk.
                        warn!("[{}] skipping {}: {e:?}", self.chain_name, ev.kind());
                        self.metrics
                            .events_failed
                            .with_label_values(&[&self.chain_name, e.error_type()])
                            .inc();
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Fetches one chunk, retrying rate-limit rejections with exponential
    /// backoff for a bounded number of attempts.
    async fn fetch_chunk(
        &self,
        adapter: &dyn ChainAdapter,
        start: u64,
        end: u64,
    ) -> IndexerResult<Vec<crate::chain::RawChainItem>> {
        let mut attempt: u32 = 0;
        loop {
            match adapter.fetch_items(start, end).await {
                Ok(items) => return Ok(items),
                Err(e) if e.is_rate_limited() && attempt < self.rate_limit_max_retries => {
                    attempt += 1;
                    let delay = RATE_LIMIT_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        "[{}] rate limited fetching [{start}, {end}], retry {attempt}/{} in {delay:?}",
                        self.chain_name, self.rate_limit_max_retries
                    );
                    self.metrics
                        .rpc_errors
                        .with_label_values(&[&self.chain_name, e.error_type()])
                        .inc();
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.metrics
                        .rpc_errors
                        .with_label_values(&[&self.chain_name, e.error_type()])
                        .inc();
                    return Err(e);
                }
            }
        }
    }
}
