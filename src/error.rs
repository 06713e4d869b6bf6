//! Error taxonomy (§7). One enum, one place mapping each kind to an HTTP
//! status and JSON body — handlers never hand-roll status codes.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// All the ways a mutating operation can fail, matching §7's taxonomy by
/// kind rather than by exception type.
#[derive(Debug, Clone)]
pub enum ChainError {
    /// First block not at height 1, or not exactly `currentHeight + 1`.
    InvalidHeight { expected: u64, received: u64 },
    /// An input referenced a UTXO absent from the pre-block snapshot.
    InputNotFound { key: String },
    /// A non-coinbase transaction where `inSum != outSum`.
    ValueMismatch { tx_id: String, in_sum: i64, out_sum: i64 },
    /// The submitted block id didn't match the computed digest.
    InvalidBlockId {
        expected: String,
        received: String,
        hash_input: String,
    },
    /// Rollback target height is not a finite integer >= 1.
    InvalidHeightParam { received: String },
    /// Rollback target height is above the current chain tip.
    TargetAboveHead { target: u64, current: u64 },
    /// Persistent-store failure (open, transaction abort, constraint
    /// violation). The in-memory index is guaranteed untouched.
    StoreError(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::InvalidHeight { expected, received } => write!(
                f,
                "invalid height: expected {expected}, received {received}"
            ),
            ChainError::InputNotFound { key } => write!(f, "input not found: {key}"),
            ChainError::ValueMismatch {
                tx_id,
                in_sum,
                out_sum,
            } => write!(
                f,
                "value mismatch in tx {tx_id}: inSum={in_sum} outSum={out_sum}"
            ),
            ChainError::InvalidBlockId {
                expected, received, ..
            } => write!(
                f,
                "invalid block id: expected {expected}, received {received}"
            ),
            ChainError::InvalidHeightParam { received } => {
                write!(f, "invalid height parameter: {received}")
            }
            ChainError::TargetAboveHead { target, current } => write!(
                f,
                "rollback target {target} is above current height {current}"
            ),
            ChainError::StoreError(msg) => write!(f, "store error: {msg}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<rocksdb::Error> for ChainError {
    fn from(e: rocksdb::Error) -> Self {
        ChainError::StoreError(e.to_string())
    }
}

impl IntoResponse for ChainError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChainError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };

        let mut body = json!({ "error": self.to_string() });
        if let ChainError::InvalidBlockId {
            expected,
            received,
            hash_input,
        } = &self
        {
            body["expected"] = json!(expected);
            body["received"] = json!(received);
            body["hashInput"] = json!(hash_input);
        }

        (status, Json(body)).into_response()
    }
}
