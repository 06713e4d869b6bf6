//! Core data model: outputs, inputs, transactions, blocks.
//!
//! These are the wire/request shapes accepted at `POST /blocks` as well as
//! the shapes persisted to the store (via bincode) and held in the
//! in-memory index.

use serde::{Deserialize, Serialize};

/// An amount credited to an address. Identity is the pair
/// `(producing_tx_id, output_index)`, carried alongside the value itself
/// rather than inside it — see [`utxo_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub address: String,
    pub value: i64,
}

/// A reference to a prior output being spent. Carries no value of its own;
/// the value is looked up from the referenced [`Output`] at validation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    #[serde(rename = "txId")]
    pub tx_id: String,
    pub index: u32,
}

/// A transaction with zero inputs is a coinbase: it mints value rather than
/// spending it, and conservation (§4.3) does not apply to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub outputs: Vec<Output>,
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// A block as submitted by the client. `id` is the lowercase hex SHA-256
/// digest described in §4.3 / §6; `height` must be contiguous with the
/// current chain tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub height: u64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Build the UTXO-set key `"{tx_id}:{index}"` for an output identity.
pub fn utxo_key(tx_id: &str, index: u32) -> String {
    format!("{tx_id}:{index}")
}

/// The persisted (store-side) form of an output: the same `(address,
/// value)` pair plus the spent flag the persistent store's `outputs`
/// relation carries (§4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOutput {
    pub address: String,
    pub value: i64,
    pub is_spent: bool,
}

/// The persisted form of a transaction: its block, inputs, and outputs —
/// enough to replay it during a rewind (§4.5) without re-reading the
/// original block payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub block_id: String,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

/// The persisted form of a block: just enough to reconstruct the journal
/// and to re-walk its transactions in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    pub id: String,
    pub height: u64,
    pub tx_ids: Vec<String>,
}
