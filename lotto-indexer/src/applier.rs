// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Routes decoded events into the store and fires downstream boundaries.
//!
//! The applier is where at-least-once delivery becomes exactly-once effects:
//! the store reports `Duplicate` for redelivered events and the applier makes
//! sure notifications and aggregates only fire on first insert.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::IndexerResult;
use crate::events::LotteryEvent;
use crate::metrics::IndexerMetrics;
use crate::notify::{AutomationTrigger, WinNotifier};
use crate::store::{Applied, LottoStore};

pub struct EventApplier {
    chain_name: String,
    store: Arc<dyn LottoStore>,
    win_notifier: Arc<dyn WinNotifier>,
    automation: Arc<dyn AutomationTrigger>,
    metrics: Arc<IndexerMetrics>,
}

impl EventApplier {
    pub fn new(
        chain_name: impl Into<String>,
        store: Arc<dyn LottoStore>,
        win_notifier: Arc<dyn WinNotifier>,
        automation: Arc<dyn AutomationTrigger>,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        Self {
            chain_name: chain_name.into(),
            store,
            win_notifier,
            automation,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn LottoStore> {
        &self.store
    }

    /// Applies one event. Errors bubble to the caller, which decides whether
    /// the failure is skippable or aborts the batch.
    pub async fn apply(&self, ev: &LotteryEvent) -> IndexerResult<Applied> {
        let applied = match ev {
            LotteryEvent::TicketPurchased(e) => self.store.apply_ticket_purchase(e).await?,
            LotteryEvent::FirstTicketBonus(e) => self.store.apply_first_ticket_bonus(e).await?,
            LotteryEvent::WinnerPicked(e) => {
                let applied = self.store.apply_winner_picked(e).await?;
                if applied == Applied::Inserted {
                    self.win_notifier.notify_winner(&self.chain_name, e).await;
                }
                applied
            }
            LotteryEvent::PrizeClaimed(e) => self.store.apply_prize_claimed(e).await?,
            LotteryEvent::AllRequestsCompleted { contract_key, .. } => {
                // Pure signal, nothing persisted.
                self.automation
                    .all_requests_completed(&self.chain_name, contract_key)
                    .await;
                Applied::Inserted
            }
        };
        match applied {
            Applied::Inserted => {
                let key = ev.key();
                info!(
                    "[{}] applied {} at {}#{} (position {})",
                    self.chain_name,
                    ev.kind(),
                    key.tx_hash,
                    key.index,
                    key.block_position
                );
                self.metrics
                    .events_applied
                    .with_label_values(&[&self.chain_name, ev.kind()])
                    .inc();
            }
            Applied::Duplicate => {
                let key = ev.key();
                debug!(
                    "[{}] duplicate {} at {}#{}, skipping",
                    self.chain_name,
                    ev.kind(),
                    key.tx_hash,
                    key.index
                );
                self.metrics
                    .events_duplicate
                    .with_label_values(&[&self.chain_name, ev.kind()])
                    .inc();
            }
        }
        Ok(applied)
    }
}
