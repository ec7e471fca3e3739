// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerError {
    // An event references a round row that does not exist yet
    RoundNotFound { token: String, round_id: u32 },
    // Provider rejected the request due to rate limiting
    RateLimited(String),
    // Transient RPC/transport error, worth retrying
    TransientRpcError(String),
    // Non-transient RPC error
    RpcError(String),
    // Chain payload failed to decode into a canonical event
    DecodeError(String),
    // Relational store failure
    StorageError(String),
    // Bad or missing configuration
    ConfigError(String),
    // Chain name not registered with the supervisor
    UnknownChain(String),
    // Internal indexer error
    InternalError(String),
}

pub type IndexerResult<T> = Result<T, IndexerError>;

impl IndexerError {
    pub fn error_type(&self) -> &'static str {
        match self {
            IndexerError::RoundNotFound { .. } => "round_not_found",
            IndexerError::RateLimited(_) => "rate_limited",
            IndexerError::TransientRpcError(_) => "transient_rpc_error",
            IndexerError::RpcError(_) => "rpc_error",
            IndexerError::DecodeError(_) => "decode_error",
            IndexerError::StorageError(_) => "storage_error",
            IndexerError::ConfigError(_) => "config_error",
            IndexerError::UnknownChain(_) => "unknown_chain",
            IndexerError::InternalError(_) => "internal_error",
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, IndexerError::RateLimited(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexerError::RateLimited(_) | IndexerError::TransientRpcError(_)
        )
    }

    // Rate-limit answers come back in many shapes (HTTP 429, provider-specific
    // "rate limit exceeded" strings), so classification is by message.
    pub fn from_rpc_message(msg: String) -> Self {
        let lowered = msg.to_lowercase();
        if lowered.contains("429") || lowered.contains("rate") {
            IndexerError::RateLimited(msg)
        } else if lowered.contains("timeout")
            || lowered.contains("timed out")
            || lowered.contains("connection")
        {
            IndexerError::TransientRpcError(msg)
        } else {
            IndexerError::RpcError(msg)
        }
    }
}

impl std::fmt::Display for IndexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexerError::RoundNotFound { token, round_id } => {
                write!(f, "round {round_id} for token {token} not found")
            }
            IndexerError::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            IndexerError::TransientRpcError(msg) => write!(f, "transient rpc error: {msg}"),
            IndexerError::RpcError(msg) => write!(f, "rpc error: {msg}"),
            IndexerError::DecodeError(msg) => write!(f, "decode error: {msg}"),
            IndexerError::StorageError(msg) => write!(f, "storage error: {msg}"),
            IndexerError::ConfigError(msg) => write!(f, "config error: {msg}"),
            IndexerError::UnknownChain(name) => write!(f, "unknown chain: {name}"),
            IndexerError::InternalError(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for IndexerError {}

impl From<diesel::result::Error> for IndexerError {
    fn from(e: diesel::result::Error) -> Self {
        IndexerError::StorageError(e.to_string())
    }
}
