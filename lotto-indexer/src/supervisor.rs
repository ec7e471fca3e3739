// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-chain connection lifecycle. One task per chain owns the adapter,
//! a poller/consumer pair for live events and a periodic health probe.
//! Exactly one adapter instance is live per chain; teardown completes
//! before the replacement is created.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::applier::EventApplier;
use crate::backfill::BackfillEngine;
use crate::chain::{AdapterFactory, ChainAdapter};
use crate::config::{ChainConfig, IndexerConfig};
use crate::decode::{decoder_for, EventDecoder};
use crate::error::{IndexerError, IndexerResult};
use crate::events::LotteryEvent;
use crate::metrics::IndexerMetrics;
use crate::notify::{AutomationTrigger, WinNotifier};
use crate::store::LottoStore;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Retry budget exhausted; only an operator force-reconnect revives it.
    Failed,
}

impl std::fmt::Display for ChainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChainState::Disconnected => "disconnected",
            ChainState::Connecting => "connecting",
            ChainState::Connected => "connected",
            ChainState::Reconnecting => "reconnecting",
            ChainState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    pub state: ChainState,
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub last_height: Option<u64>,
}

impl ChainStatus {
    fn initial() -> Self {
        Self {
            state: ChainState::Disconnected,
            connected: false,
            reconnect_attempts: 0,
            last_height: None,
        }
    }
}

#[derive(Debug)]
enum ChainCommand {
    ForceReconnect,
}

/// Linear backoff: attempt n waits base * n, `None` past the budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub(crate) fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * attempt)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HealthVerdict {
    Healthy,
    Behind { from: u64, to: u64 },
}

/// Lag check against the persisted cursor. Responsive but lagging beyond the
/// threshold means the live tail lost events and a catch-up replay is due.
pub(crate) fn assess_lag(cursor: u64, height: u64, threshold: u64) -> HealthVerdict {
    if height.saturating_sub(cursor) > threshold {
        HealthVerdict::Behind {
            from: cursor + 1,
            to: height,
        }
    } else {
        HealthVerdict::Healthy
    }
}

struct ChainHandle {
    status: Arc<RwLock<ChainStatus>>,
    command_tx: mpsc::Sender<ChainCommand>,
    cancel: CancellationToken,
    join: Mutex<Option<JoinHandle<()>>>,
}

type Registration = (ChainConfig, Arc<dyn AdapterFactory>);

pub struct ConnectionSupervisor {
    config: Arc<IndexerConfig>,
    store: Arc<dyn LottoStore>,
    win_notifier: Arc<dyn WinNotifier>,
    automation: Arc<dyn AutomationTrigger>,
    metrics: Arc<IndexerMetrics>,
    pending: Mutex<Vec<Registration>>,
    chains: Mutex<HashMap<String, Arc<ChainHandle>>>,
}

impl ConnectionSupervisor {
    pub fn new(
        config: Arc<IndexerConfig>,
        store: Arc<dyn LottoStore>,
        win_notifier: Arc<dyn WinNotifier>,
        automation: Arc<dyn AutomationTrigger>,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        Self {
            config,
            store,
            win_notifier,
            automation,
            metrics,
            pending: Mutex::new(Vec::new()),
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a chain. Nothing connects until `start`.
    pub fn add_chain(&self, chain_config: ChainConfig, factory: Arc<dyn AdapterFactory>) {
        self.pending
            .lock()
            .unwrap()
            .push((chain_config, factory));
    }

    /// Spawns one supervision task per registered chain.
    pub fn start(&self) {
        let registrations: Vec<Registration> = self.pending.lock().unwrap().drain(..).collect();
        for (chain_config, factory) in registrations {
            let chain_name = chain_config.chain_name.clone();
            let status = Arc::new(RwLock::new(ChainStatus::initial()));
            let (command_tx, command_rx) = mpsc::channel(8);
            let cancel = CancellationToken::new();

            let applier = Arc::new(EventApplier::new(
                chain_name.clone(),
                self.store.clone(),
                self.win_notifier.clone(),
                self.automation.clone(),
                self.metrics.clone(),
            ));
            let decoder = decoder_for(chain_config.kind);
            let backfill = BackfillEngine::new(
                chain_name.clone(),
                applier.clone(),
                decoder.clone(),
                self.config.max_chunk_size,
                self.config.rate_limit_max_retries,
                self.metrics.clone(),
            );
            let runtime = ChainRuntime {
                chain_name: chain_name.clone(),
                chain_config,
                global: self.config.clone(),
                factory,
                store: self.store.clone(),
                applier,
                decoder,
                backfill,
                metrics: self.metrics.clone(),
                status: status.clone(),
                cancel: cancel.clone(),
                command_rx,
            };
            let join = tokio::spawn(runtime.run());
            self.chains.lock().unwrap().insert(
                chain_name,
                Arc::new(ChainHandle {
                    status,
                    command_tx,
                    cancel,
                    join: Mutex::new(Some(join)),
                }),
            );
        }
    }

    pub fn status(&self, chain_name: &str) -> IndexerResult<ChainStatus> {
        let chains = self.chains.lock().unwrap();
        let handle = chains
            .get(chain_name)
            .ok_or_else(|| IndexerError::UnknownChain(chain_name.to_string()))?;
        let status = handle.status.read().unwrap().clone();
        Ok(status)
    }

    pub fn status_all(&self) -> HashMap<String, ChainStatus> {
        self.chains
            .lock()
            .unwrap()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.status.read().unwrap().clone()))
            .collect()
    }

    /// Operator escape hatch: drops the current connection (if any), resets
    /// the attempt counter and reconnects immediately. Revives `Failed`.
    pub async fn force_reconnect(&self, chain_name: &str) -> IndexerResult<()> {
        let handle = {
            let chains = self.chains.lock().unwrap();
            chains
                .get(chain_name)
                .ok_or_else(|| IndexerError::UnknownChain(chain_name.to_string()))?
                .clone()
        };
        handle
            .command_tx
            .send(ChainCommand::ForceReconnect)
            .await
            .map_err(|_| IndexerError::UnknownChain(chain_name.to_string()))
    }

    pub async fn shutdown(&self) {
        let handles: Vec<Arc<ChainHandle>> =
            self.chains.lock().unwrap().values().cloned().collect();
        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles {
            let join = handle.join.lock().unwrap().take();
            if let Some(join) = join {
                if let Err(e) = join.await {
                    error!("chain task panicked during shutdown: {e}");
                }
            }
        }
    }
}

enum Exit {
    Shutdown,
    ConnectionLost,
    Forced,
}

struct ChainRuntime {
    chain_name: String,
    chain_config: ChainConfig,
    global: Arc<IndexerConfig>,
    factory: Arc<dyn AdapterFactory>,
    store: Arc<dyn LottoStore>,
    applier: Arc<EventApplier>,
    decoder: Arc<dyn EventDecoder>,
    backfill: BackfillEngine,
    metrics: Arc<IndexerMetrics>,
    status: Arc<RwLock<ChainStatus>>,
    cancel: CancellationToken,
    command_rx: mpsc::Receiver<ChainCommand>,
}

impl ChainRuntime {
    async fn run(mut self) {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(self.global.reconnect_base_delay_ms),
            max_attempts: self.global.max_reconnect_attempts,
        };
        let mut attempts: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(
                if attempts == 0 {
                    ChainState::Connecting
                } else {
                    ChainState::Reconnecting
                },
                attempts,
            );
            match self.factory.create().await {
                Ok(adapter) => {
                    self.set_connected(true);
                    let exit = self.run_connected(adapter, &mut attempts).await;
                    self.set_connected(false);
                    match exit {
                        Exit::Shutdown => break,
                        Exit::Forced => {
                            info!("[{}] forced reconnect", self.chain_name);
                            continue;
                        }
                        Exit::ConnectionLost => {}
                    }
                }
                Err(e) => {
                    warn!("[{}] connection attempt failed: {e:?}", self.chain_name);
                }
            }
            attempts += 1;
            self.metrics
                .reconnect_attempts
                .with_label_values(&[&self.chain_name])
                .inc();
            match policy.delay_for(attempts) {
                Some(delay) => {
                    self.set_state(ChainState::Reconnecting, attempts);
                    info!(
                        "[{}] reconnect attempt {attempts}/{} in {delay:?}",
                        self.chain_name, policy.max_attempts
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                        cmd = self.command_rx.recv() => match cmd {
                            Some(ChainCommand::ForceReconnect) => attempts = 0,
                            None => break,
                        },
                    }
                }
                None => {
                    error!(
                        "[{}] giving up after {} reconnect attempts",
                        self.chain_name, policy.max_attempts
                    );
                    self.set_state(ChainState::Failed, policy.max_attempts);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        cmd = self.command_rx.recv() => match cmd {
                            Some(ChainCommand::ForceReconnect) => attempts = 0,
                            None => break,
                        },
                    }
                }
            }
        }
        self.set_state(ChainState::Disconnected, 0);
    }

    async fn run_connected(&mut self, adapter: Arc<dyn ChainAdapter>, attempts: &mut u32) -> Exit {
        let cursor_key = adapter.cursor_key();
        let height = match crate::probe_height_with_retries(
            adapter.as_ref(),
            Duration::from_secs(30),
        )
        .await
        {
            Ok(height) => height,
            Err(e) => {
                warn!("[{}] unresponsive right after connect: {e:?}", self.chain_name);
                return Exit::ConnectionLost;
            }
        };
        // A responsive node resets the retry budget.
        *attempts = 0;
        self.set_state(ChainState::Connected, 0);
        self.observe_height(height);
        info!("[{}] connected at height {height}", self.chain_name);

        // Catch up on whatever happened while disconnected.
        let next = match self.next_position(&cursor_key).await {
            Ok(next) => next,
            Err(e) => {
                error!("[{}] cannot read sync cursor: {e:?}", self.chain_name);
                return Exit::ConnectionLost;
            }
        };
        if next <= height && !self.backfill.backfill(adapter.as_ref(), next, height).await {
            warn!(
                "[{}] catch-up backfill incomplete, will retry on next probe",
                self.chain_name
            );
        }

        // Live tail: the poller fetches and decodes, the consumer applies and
        // advances the cursor. Exactly one consumer writes per chain.
        let (event_tx, event_rx) = mpsc::channel(self.global.event_channel_size);
        let tail_cancel = CancellationToken::new();
        let poller = tokio::spawn(run_poller(
            adapter.clone(),
            self.decoder.clone(),
            event_tx,
            tail_cancel.clone(),
            Duration::from_millis(self.chain_config.poll_interval_ms),
            height + 1,
            self.global.max_chunk_size,
            self.chain_name.clone(),
        ));
        let consumer = tokio::spawn(run_consumer(
            self.applier.clone(),
            self.store.clone(),
            event_rx,
            self.chain_name.clone(),
            cursor_key.clone(),
            self.metrics.clone(),
        ));

        let exit = self.probe_loop(adapter.as_ref(), &cursor_key).await;

        tail_cancel.cancel();
        let _ = poller.await;
        let _ = consumer.await;
        exit
    }

    async fn probe_loop(&mut self, adapter: &dyn ChainAdapter, cursor_key: &str) -> Exit {
        let mut probe = tokio::time::interval(Duration::from_millis(
            self.global.health_probe_interval_ms,
        ));
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval fires immediately; the connect path already probed
        probe.tick().await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Exit::Shutdown,
                cmd = self.command_rx.recv() => match cmd {
                    Some(ChainCommand::ForceReconnect) => return Exit::Forced,
                    None => return Exit::Shutdown,
                },
                _ = probe.tick() => {
                    match tokio::time::timeout(PROBE_TIMEOUT, adapter.latest_height()).await {
                        Ok(Ok(height)) => {
                            self.observe_height(height);
                            if let Err(e) = self.check_lag(adapter, cursor_key, height).await {
                                error!("[{}] lag check failed: {e:?}", self.chain_name);
                            }
                        }
                        Ok(Err(e)) => {
                            warn!("[{}] health probe failed: {e:?}", self.chain_name);
                            return Exit::ConnectionLost;
                        }
                        Err(_) => {
                            warn!("[{}] health probe timed out", self.chain_name);
                            return Exit::ConnectionLost;
                        }
                    }
                }
            }
        }
    }

    async fn check_lag(
        &self,
        adapter: &dyn ChainAdapter,
        cursor_key: &str,
        height: u64,
    ) -> IndexerResult<()> {
        let cursor = self
            .store
            .cursor(&self.chain_name, cursor_key)
            .await?
            .unwrap_or(self.chain_config.start_position.saturating_sub(1));
        if let HealthVerdict::Behind { from, to } =
            assess_lag(cursor, height, self.global.blocks_behind_threshold)
        {
            warn!(
                "[{}] {} position(s) behind (cursor {cursor}, height {height}), catching up",
                self.chain_name,
                height - cursor
            );
            self.backfill.backfill(adapter, from, to).await;
        }
        Ok(())
    }

    async fn next_position(&self, cursor_key: &str) -> IndexerResult<u64> {
        let cursor = self.store.cursor(&self.chain_name, cursor_key).await?;
        Ok(match cursor {
            Some(position) => position + 1,
            None => self.chain_config.start_position,
        })
    }

    fn set_state(&self, state: ChainState, attempts: u32) {
        let mut status = self.status.write().unwrap();
        status.state = state;
        status.reconnect_attempts = attempts;
        if state != ChainState::Connected {
            status.connected = false;
        }
    }

    fn set_connected(&self, connected: bool) {
        self.status.write().unwrap().connected = connected;
        self.metrics
            .chain_connected
            .with_label_values(&[&self.chain_name])
            .set(connected as i64);
    }

    fn observe_height(&self, height: u64) {
        self.status.write().unwrap().last_height = Some(height);
        self.metrics
            .last_observed_height
            .with_label_values(&[&self.chain_name])
            .set(height as i64);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_poller(
    adapter: Arc<dyn ChainAdapter>,
    decoder: Arc<dyn EventDecoder>,
    event_tx: mpsc::Sender<LotteryEvent>,
    cancel: CancellationToken,
    poll_interval: Duration,
    start: u64,
    max_chunk_size: u64,
    chain_name: String,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut next = start;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        let height = match adapter.latest_height().await {
            Ok(height) => height,
            Err(e) => {
                warn!("[{chain_name}] poll height failed: {e:?}");
                continue;
            }
        };
        if height < next {
            continue;
        }
        // Note: query may fail if range is too big. Callsite is responsible
        // for chunking; anything beyond one chunk is left to the lag check.
        let to = height.min(next + (max_chunk_size - 1));
        let mut items = match adapter.fetch_items(next, to).await {
            Ok(items) => items,
            Err(e) => {
                warn!("[{chain_name}] poll fetch [{next}, {to}] failed: {e:?}");
                continue;
            }
        };
        if adapter.history_newest_first() {
            items.reverse();
        }
        let mut window_complete = true;
        for item in &items {
            let events = match decoder.decode(adapter.as_ref(), item).await {
                Ok(events) => events,
                Err(e @ IndexerError::DecodeError(_)) => {
                    warn!("[{chain_name}] skipping undecodable item: {e:?}");
                    continue;
                }
                Err(e) => {
                    // A transient failure (e.g. a rate-limited read-back) must
                    // not advance the window: once later events push the
                    // cursor past this position the lag check can no longer
                    // replay it. Refetch the same window on the next tick;
                    // re-sent events are deduplicated by the applier.
                    warn!("[{chain_name}] decode in [{next}, {to}] failed, will retry: {e:?}");
                    window_complete = false;
                    break;
                }
            };
            for ev in events {
                if event_tx.send(ev).await.is_err() {
                    return;
                }
            }
        }
        if window_complete {
            next = to + 1;
        }
    }
}

async fn run_consumer(
    applier: Arc<EventApplier>,
    store: Arc<dyn LottoStore>,
    mut event_rx: mpsc::Receiver<LotteryEvent>,
    chain_name: String,
    cursor_key: String,
    metrics: Arc<IndexerMetrics>,
) {
    while let Some(ev) = event_rx.recv().await {
        match applier.apply(&ev).await {
            Ok(_) => {
                let position = ev.key().block_position;
                if let Err(e) = store.set_cursor(&chain_name, &cursor_key, position).await {
                    error!("[{chain_name}] cursor write failed, stopping live apply: {e:?}");
                    return;
                }
                metrics
                    .last_processed_position
                    .with_label_values(&[&chain_name])
                    .set(position as i64);
            }
            Err(e @ IndexerError::RoundNotFound { .. }) => {
                warn!("[{chain_name}] skipping {}: {e:?}", ev.kind());
                metrics
                    .events_failed
                    .with_label_values(&[&chain_name, e.error_type()])
                    .inc();
            }
            Err(e) => {
                // Cursor stops here; the next lag check replays the gap.
                error!("[{chain_name}] apply failed, stopping live apply: {e:?}");
                metrics
                    .events_failed
                    .with_label_values(&[&chain_name, e.error_type()])
                    .inc();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainKind;
    use crate::notify::{LogAutomationTrigger, LogWinNotifier};
    use crate::store::mem::MemStore;
    use crate::test_utils::{MockAdapter, MockFactory};

    #[test]
    fn test_reconnect_policy_delays() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(5),
            max_attempts: 5,
        };
        let delays: Vec<_> = (1..=5).map(|n| policy.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(5)),
                Some(Duration::from_secs(10)),
                Some(Duration::from_secs(15)),
                Some(Duration::from_secs(20)),
                Some(Duration::from_secs(25)),
            ]
        );
        assert_eq!(policy.delay_for(6), None);
    }

    #[test]
    fn test_assess_lag_threshold() {
        assert_eq!(
            assess_lag(100, 107, 5),
            HealthVerdict::Behind { from: 101, to: 107 }
        );
        assert_eq!(assess_lag(100, 104, 5), HealthVerdict::Healthy);
        assert_eq!(assess_lag(100, 105, 5), HealthVerdict::Healthy);
        assert_eq!(assess_lag(100, 100, 5), HealthVerdict::Healthy);
        assert_eq!(assess_lag(0, 100, 5), HealthVerdict::Behind { from: 1, to: 100 });
    }

    fn test_config(chain: ChainConfig) -> Arc<IndexerConfig> {
        Arc::new(IndexerConfig {
            chains: vec![chain],
            blocks_behind_threshold: 5,
            health_probe_interval_ms: 60_000,
            reconnect_base_delay_ms: 5_000,
            max_reconnect_attempts: 5,
            max_chunk_size: 10_000,
            rate_limit_max_retries: 0,
            event_channel_size: 64,
        })
    }

    fn chain_config(name: &str) -> ChainConfig {
        ChainConfig {
            chain_name: name.to_string(),
            kind: ChainKind::Evm,
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 56,
            contract_addresses: vec!["0xlotto".to_string()],
            start_position: 101,
            poll_interval_ms: 3_600_000,
        }
    }

    fn supervisor(config: Arc<IndexerConfig>, store: Arc<MemStore>) -> ConnectionSupervisor {
        ConnectionSupervisor::new(
            config,
            store,
            Arc::new(LogWinNotifier),
            Arc::new(LogAutomationTrigger),
            Arc::new(IndexerMetrics::new_for_testing()),
        )
    }

    /// Scenario: the node never answers. Attempts back off linearly (5, 10,
    /// 15, 20, 25s), then the chain parks in Failed until force-reconnect
    /// resets the counter.
    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backs_off_then_fails() {
        let store = Arc::new(MemStore::new());
        let adapter = Arc::new(MockAdapter::new("bsc", 56));
        let factory = Arc::new(MockFactory::failing(adapter, u32::MAX));
        let sup = supervisor(test_config(chain_config("bsc")), store);
        sup.add_chain(chain_config("bsc"), factory.clone());
        sup.start();

        // 5 + 10 + 15 + 20 + 25 = 75s of backoff, then Failed.
        tokio::time::sleep(Duration::from_secs(76)).await;
        let status = sup.status("bsc").unwrap();
        assert_eq!(status.state, ChainState::Failed);
        assert_eq!(status.reconnect_attempts, 5);
        assert!(!status.connected);
        // initial attempt plus the five retries
        assert_eq!(factory.attempts(), 6);

        // Parked: no further attempts without operator action.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(factory.attempts(), 6);

        sup.force_reconnect("bsc").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(factory.attempts() >= 7);
        let status = sup.status("bsc").unwrap();
        assert_ne!(status.state, ChainState::Failed);

        sup.shutdown().await;
    }

    /// Scenario: reconnect succeeds on the third attempt and the chain comes
    /// back up with the attempt counter reset.
    #[tokio::test(start_paused = true)]
    async fn test_reconnect_recovers_within_budget() {
        let store = Arc::new(MemStore::new());
        let adapter = Arc::new(MockAdapter::new("bsc", 56).with_height(100));
        let factory = Arc::new(MockFactory::failing(adapter, 2));
        let sup = supervisor(test_config(chain_config("bsc")), store);
        sup.add_chain(chain_config("bsc"), factory.clone());
        sup.start();

        // attempts at t=0 (fail), t=5 (fail), t=15 (success)
        tokio::time::sleep(Duration::from_secs(16)).await;
        let status = sup.status("bsc").unwrap();
        assert_eq!(status.state, ChainState::Connected);
        assert!(status.connected);
        assert_eq!(status.reconnect_attempts, 0);
        assert_eq!(status.last_height, Some(100));
        assert_eq!(factory.attempts(), 3);

        sup.shutdown().await;
    }

    /// Scenario: on connect the chain head is past the persisted cursor, so
    /// the supervisor replays the gap through the backfill engine before
    /// tailing live.
    #[tokio::test(start_paused = true)]
    async fn test_catch_up_from_cursor_on_connect() {
        let store = Arc::new(MemStore::new());
        let adapter = Arc::new(MockAdapter::new("bsc", 56).with_height(107));
        store
            .set_cursor("bsc", &adapter.cursor_key(), 100)
            .await
            .unwrap();
        let factory = Arc::new(MockFactory::new(adapter.clone()));
        let sup = supervisor(test_config(chain_config("bsc")), store.clone());
        sup.add_chain(chain_config("bsc"), factory);
        sup.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(adapter.fetch_calls().contains(&(101, 107)));
        assert_eq!(
            store.cursor("bsc", &adapter.cursor_key()).await.unwrap(),
            Some(107)
        );
        assert_eq!(sup.status("bsc").unwrap().state, ChainState::Connected);

        sup.shutdown().await;
    }

    /// Scenario: a health probe fails mid-session. The chain drops the
    /// connection, backs off once and comes back up against the node's new
    /// head.
    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_triggers_reconnect() {
        let store = Arc::new(MemStore::new());
        let adapter = Arc::new(MockAdapter::new("bsc", 56).with_height(100));
        let factory = Arc::new(MockFactory::new(adapter.clone()));
        let sup = supervisor(test_config(chain_config("bsc")), store);
        sup.add_chain(chain_config("bsc"), factory.clone());
        sup.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sup.status("bsc").unwrap().state, ChainState::Connected);
        assert_eq!(factory.attempts(), 1);

        // Next periodic probe (t=60) fails; the reconnect probe then sees the
        // chain at a new head.
        adapter.push_height_error(IndexerError::TransientRpcError(
            "connection reset".to_string(),
        ));
        adapter.push_height(150);

        // 60s probe, 5s backoff, reconnect
        tokio::time::sleep(Duration::from_secs(70)).await;
        let status = sup.status("bsc").unwrap();
        assert_eq!(status.state, ChainState::Connected);
        assert_eq!(status.reconnect_attempts, 0);
        assert_eq!(status.last_height, Some(150));
        assert_eq!(factory.attempts(), 2);

        sup.shutdown().await;
    }

    /// Scenario: decoding an item fails transiently (a rate-limited winner
    /// read-back, say). The poller must refetch the same window instead of
    /// advancing past the undelivered event, which would orphan it forever.
    #[tokio::test(start_paused = true)]
    async fn test_poller_retries_window_on_transient_decode_error() {
        use std::sync::atomic::{AtomicU32, Ordering};

        use crate::chain::{EvmLogItem, RawChainItem};
        use crate::decode::EventDecoder;
        use crate::events::{EventKey, FirstTicketBonusAwarded, TicketPurchased};

        // Index 0 fails transiently for the first two decodes, then yields
        // the round-opening bonus; index 1 always decodes to a purchase.
        struct FlakyDecoder {
            failures_left: AtomicU32,
        }

        #[async_trait::async_trait]
        impl EventDecoder for FlakyDecoder {
            async fn decode(
                &self,
                adapter: &dyn ChainAdapter,
                item: &RawChainItem,
            ) -> IndexerResult<Vec<LotteryEvent>> {
                let RawChainItem::EvmLog(item) = item else {
                    return Ok(vec![]);
                };
                let index = item.log.log_index.unwrap_or_default().as_u32();
                let key = EventKey {
                    chain_id: adapter.chain_id(),
                    tx_hash: format!("0xtx{index}"),
                    index,
                    block_position: 100,
                };
                if index == 0 {
                    let left = self.failures_left.load(Ordering::SeqCst);
                    if left > 0 {
                        self.failures_left.store(left - 1, Ordering::SeqCst);
                        return Err(IndexerError::TransientRpcError(
                            "read-back timed out".to_string(),
                        ));
                    }
                    return Ok(vec![LotteryEvent::FirstTicketBonus(
                        FirstTicketBonusAwarded {
                            key,
                            contract_key: "0xlotto".to_string(),
                            token: "0xtoken".to_string(),
                            round_id: 7,
                            buyer: "0xalice".to_string(),
                            round_start_time_ms: 1_000,
                            round_end_time_ms: 2_000,
                            timestamp_ms: 1_000,
                        },
                    )]);
                }
                Ok(vec![LotteryEvent::TicketPurchased(TicketPurchased {
                    key,
                    contract_key: "0xlotto".to_string(),
                    token: "0xtoken".to_string(),
                    round_id: 7,
                    buyer: "0xalice".to_string(),
                    count: 1,
                    total_amount: 100,
                    prize_amount: 90,
                    commission_amount: 10,
                    timestamp_ms: 1_500,
                })])
            }
        }

        fn log_item(log_index: u64) -> RawChainItem {
            let mut log = ethers::types::Log::default();
            log.log_index = Some(log_index.into());
            RawChainItem::EvmLog(EvmLogItem {
                contract: "0xlotto".to_string(),
                log,
            })
        }

        let adapter = Arc::new(
            MockAdapter::new("bsc", 56)
                .with_height(100)
                .with_items(100, vec![log_item(0), log_item(1)]),
        );
        let decoder = Arc::new(FlakyDecoder {
            failures_left: AtomicU32::new(2),
        });
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let poller = tokio::spawn(run_poller(
            adapter.clone() as Arc<dyn ChainAdapter>,
            decoder,
            event_tx,
            cancel.clone(),
            Duration::from_millis(100),
            100,
            10_000,
            "bsc".to_string(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let _ = poller.await;

        let mut received = Vec::new();
        while let Ok(ev) = event_rx.try_recv() {
            received.push(ev.key().index);
        }
        // Two failed ticks, then both events from the third.
        assert_eq!(received, vec![0, 1]);
        // The same window was refetched until the decode went through, then
        // the poller moved on and had nothing further to fetch.
        let calls = adapter.fetch_calls();
        assert!(calls.len() >= 3);
        assert!(calls.iter().all(|call| *call == (100, 100)));
    }

    /// Scenario: unknown chain names are rejected.
    #[tokio::test]
    async fn test_unknown_chain() {
        let store = Arc::new(MemStore::new());
        let sup = supervisor(test_config(chain_config("bsc")), store);
        assert!(matches!(
            sup.status("nope"),
            Err(IndexerError::UnknownChain(_))
        ));
        assert!(matches!(
            sup.force_reconnect("nope").await,
            Err(IndexerError::UnknownChain(_))
        ));
    }
}
