// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{IndexerError, IndexerResult};

// Minimal persisted-config interface: YAML or JSON, picked by extension.
pub trait Config: Serialize + DeserializeOwned {
    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = if matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yaml") | Some("yml")
        ) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Evm,
    Solana,
}

impl std::fmt::Display for ChainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainKind::Evm => write!(f, "evm"),
            ChainKind::Solana => write!(f, "solana"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    pub chain_name: String,
    pub kind: ChainKind,
    // Rpc url for the chain fullnode.
    pub rpc_url: String,
    pub chain_id: i64,
    // Lottery contract addresses (EVM) or the program id (Solana).
    pub contract_addresses: Vec<String>,
    // Block number / slot to start indexing from when no cursor exists.
    #[serde(default)]
    pub start_position: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexerConfig {
    pub chains: Vec<ChainConfig>,
    // A responsive chain whose head is further than this ahead of the cursor
    // is considered unhealthy and triggers a catch-up backfill.
    #[serde(default = "default_blocks_behind_threshold")]
    pub blocks_behind_threshold: u64,
    #[serde(default = "default_health_probe_interval_ms")]
    pub health_probe_interval_ms: u64,
    // Reconnect delay grows linearly: base * attempt.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    #[serde(default = "default_rate_limit_max_retries")]
    pub rate_limit_max_retries: u32,
    #[serde(default = "default_event_channel_size")]
    pub event_channel_size: usize,
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_blocks_behind_threshold() -> u64 {
    16
}

fn default_health_probe_interval_ms() -> u64 {
    10_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    5_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_max_chunk_size() -> u64 {
    10_000
}

fn default_rate_limit_max_retries() -> u32 {
    5
}

fn default_event_channel_size() -> usize {
    1_024
}

impl Config for IndexerConfig {}

impl IndexerConfig {
    pub fn validate(&self) -> IndexerResult<()> {
        if self.chains.is_empty() {
            return Err(IndexerError::ConfigError("no chains configured".to_string()));
        }
        if self.max_chunk_size == 0 {
            return Err(IndexerError::ConfigError(
                "max-chunk-size must be positive".to_string(),
            ));
        }
        let mut names = std::collections::HashSet::new();
        for chain in &self.chains {
            if !names.insert(chain.chain_name.as_str()) {
                return Err(IndexerError::ConfigError(format!(
                    "duplicate chain name: {}",
                    chain.chain_name
                )));
            }
            if chain.contract_addresses.is_empty() {
                return Err(IndexerError::ConfigError(format!(
                    "chain {} has no contract addresses",
                    chain.chain_name
                )));
            }
            if chain.kind == ChainKind::Solana && chain.contract_addresses.len() != 1 {
                return Err(IndexerError::ConfigError(format!(
                    "chain {} must configure exactly one program id",
                    chain.chain_name
                )));
            }
        }
        Ok(())
    }
}
