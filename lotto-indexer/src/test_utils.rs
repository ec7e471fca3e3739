// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scriptable chain adapter for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::chain::{AdapterFactory, ChainAdapter, RawChainItem};
use crate::error::{IndexerError, IndexerResult};
use crate::events::RoundResult;

#[derive(Default)]
struct FetchScript {
    /// Items handed out when a fetch starts at the given position.
    items: HashMap<u64, Vec<RawChainItem>>,
    /// Errors for fetches starting at the given position; `None` budget means
    /// fail forever, `Some(n)` fails the first n calls then succeeds.
    errors: HashMap<u64, (Option<u32>, IndexerError)>,
    calls: Vec<(u64, u64)>,
}

pub struct MockAdapter {
    chain_name: String,
    chain_id: i64,
    cursor_key: String,
    newest_first: bool,
    default_height: Mutex<Option<u64>>,
    scripted_heights: Mutex<VecDeque<IndexerResult<u64>>>,
    round_results: Mutex<HashMap<(String, u32), RoundResult>>,
    purchase_owners: Mutex<HashMap<(String, u32), String>>,
    fetch: Mutex<FetchScript>,
}

impl MockAdapter {
    pub fn new(chain_name: &str, chain_id: i64) -> Self {
        Self {
            chain_name: chain_name.to_string(),
            chain_id,
            cursor_key: "mock-contract".to_string(),
            newest_first: false,
            default_height: Mutex::new(None),
            scripted_heights: Mutex::new(VecDeque::new()),
            round_results: Mutex::new(HashMap::new()),
            purchase_owners: Mutex::new(HashMap::new()),
            fetch: Mutex::new(FetchScript::default()),
        }
    }

    pub fn with_round_result(self, token: &str, round_id: u32, result: RoundResult) -> Self {
        self.round_results
            .lock()
            .unwrap()
            .insert((token.to_string(), round_id), result);
        self
    }

    pub fn with_purchase_owner(self, round: &str, purchase_index: u32, owner: &str) -> Self {
        self.purchase_owners
            .lock()
            .unwrap()
            .insert((round.to_string(), purchase_index), owner.to_string());
        self
    }

    pub fn with_cursor_key(mut self, key: &str) -> Self {
        self.cursor_key = key.to_string();
        self
    }

    pub fn with_newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Fixed latest height for every probe not covered by `push_height`.
    pub fn with_height(self, height: u64) -> Self {
        *self.default_height.lock().unwrap() = Some(height);
        self
    }

    /// Enqueues a one-shot probe response, consumed before the default height.
    pub fn push_height(&self, height: u64) {
        self.scripted_heights.lock().unwrap().push_back(Ok(height));
    }

    pub fn push_height_error(&self, error: IndexerError) {
        self.scripted_heights.lock().unwrap().push_back(Err(error));
    }

    pub fn with_items(self, from: u64, items: Vec<RawChainItem>) -> Self {
        self.fetch.lock().unwrap().items.insert(from, items);
        self
    }

    /// Every fetch starting at `from` fails with the given error.
    pub fn with_fetch_error_at(self, from: u64, error: IndexerError) -> Self {
        self.fetch.lock().unwrap().errors.insert(from, (None, error));
        self
    }

    /// The first `times` fetches starting at `from` fail, later ones succeed.
    pub fn with_fetch_errors_at(self, from: u64, times: u32, error: IndexerError) -> Self {
        self.fetch
            .lock()
            .unwrap()
            .errors
            .insert(from, (Some(times), error));
        self
    }

    pub fn fetch_calls(&self) -> Vec<(u64, u64)> {
        self.fetch.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn chain_name(&self) -> &str {
        &self.chain_name
    }

    fn chain_id(&self) -> i64 {
        self.chain_id
    }

    fn cursor_key(&self) -> String {
        self.cursor_key.clone()
    }

    fn history_newest_first(&self) -> bool {
        self.newest_first
    }

    async fn latest_height(&self) -> IndexerResult<u64> {
        if let Some(scripted) = self.scripted_heights.lock().unwrap().pop_front() {
            return scripted;
        }
        match *self.default_height.lock().unwrap() {
            Some(height) => Ok(height),
            None => Err(IndexerError::TransientRpcError(
                "no height scripted".to_string(),
            )),
        }
    }

    async fn fetch_items(&self, from: u64, to: u64) -> IndexerResult<Vec<RawChainItem>> {
        let mut fetch = self.fetch.lock().unwrap();
        fetch.calls.push((from, to));
        if let Some((budget, error)) = fetch.errors.get_mut(&from) {
            match budget {
                None => return Err(error.clone()),
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return Err(error.clone());
                }
            }
        }
        Ok(fetch.items.get(&from).cloned().unwrap_or_default())
    }

    async fn round_result(
        &self,
        _contract_key: &str,
        token: &str,
        round_id: u32,
    ) -> IndexerResult<Option<RoundResult>> {
        Ok(self
            .round_results
            .lock()
            .unwrap()
            .get(&(token.to_string(), round_id))
            .cloned())
    }

    async fn purchase_owner(
        &self,
        round: &str,
        purchase_index: u32,
    ) -> IndexerResult<Option<String>> {
        Ok(self
            .purchase_owners
            .lock()
            .unwrap()
            .get(&(round.to_string(), purchase_index))
            .cloned())
    }
}

/// Factory that fails a scripted number of connection attempts before handing
/// out the prepared adapter.
pub struct MockFactory {
    adapter: Arc<MockAdapter>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl MockFactory {
    pub fn new(adapter: Arc<MockAdapter>) -> Self {
        Self {
            adapter,
            failures_left: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn failing(adapter: Arc<MockAdapter>, failures: u32) -> Self {
        Self {
            adapter,
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdapterFactory for MockFactory {
    async fn create(&self) -> IndexerResult<Arc<dyn ChainAdapter>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(IndexerError::TransientRpcError(
                "connection refused".to_string(),
            ));
        }
        Ok(self.adapter.clone())
    }
}
