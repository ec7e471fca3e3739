// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry, IntCounterVec,
    IntGaugeVec, Registry,
};

#[derive(Clone, Debug)]
pub struct IndexerMetrics {
    /// Latest chain height observed by the health probe, per chain.
    pub(crate) last_observed_height: IntGaugeVec,
    /// Sync cursor as persisted after the latest applied event, per chain.
    pub(crate) last_processed_position: IntGaugeVec,
    /// Chain connectivity flag (1 connected, 0 otherwise), per chain.
    pub(crate) chain_connected: IntGaugeVec,

    pub(crate) events_applied: IntCounterVec,
    pub(crate) events_duplicate: IntCounterVec,
    pub(crate) events_failed: IntCounterVec,

    pub(crate) reconnect_attempts: IntCounterVec,
    pub(crate) backfill_chunks: IntCounterVec,
    pub(crate) rpc_errors: IntCounterVec,
}

impl IndexerMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            last_observed_height: register_int_gauge_vec_with_registry!(
                "lotto_last_observed_height",
                "Latest block height or slot reported by the chain node",
                &["chain"],
                registry,
            )
            .unwrap(),
            last_processed_position: register_int_gauge_vec_with_registry!(
                "lotto_last_processed_position",
                "Sync cursor position after the latest applied event",
                &["chain"],
                registry,
            )
            .unwrap(),
            chain_connected: register_int_gauge_vec_with_registry!(
                "lotto_chain_connected",
                "Whether the chain connection is currently up",
                &["chain"],
                registry,
            )
            .unwrap(),
            events_applied: register_int_counter_vec_with_registry!(
                "lotto_events_applied",
                "Total number of events persisted, by chain and event kind",
                &["chain", "kind"],
                registry,
            )
            .unwrap(),
            events_duplicate: register_int_counter_vec_with_registry!(
                "lotto_events_duplicate",
                "Total number of redelivered events skipped by the natural key guard",
                &["chain", "kind"],
                registry,
            )
            .unwrap(),
            events_failed: register_int_counter_vec_with_registry!(
                "lotto_events_failed",
                "Total number of events that failed to apply, by chain and error type",
                &["chain", "error_type"],
                registry,
            )
            .unwrap(),
            reconnect_attempts: register_int_counter_vec_with_registry!(
                "lotto_reconnect_attempts",
                "Total number of reconnection attempts, per chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            backfill_chunks: register_int_counter_vec_with_registry!(
                "lotto_backfill_chunks",
                "Total number of backfill chunks processed, per chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            rpc_errors: register_int_counter_vec_with_registry!(
                "lotto_rpc_errors",
                "Total number of chain RPC errors, by chain and error type",
                &["chain", "error_type"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let registry = Registry::new();
        let metrics = IndexerMetrics::new(&registry);
        metrics.events_applied.with_label_values(&["bsc", "ticket_purchased"]).inc();
        metrics.last_observed_height.with_label_values(&["bsc"]).set(42);
        assert!(!registry.gather().is_empty());
    }
}
