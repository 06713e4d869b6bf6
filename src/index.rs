//! In-memory index (C2, §4.2): a `HashMap`-backed mirror of the store —
//! UTXO set, balance map, block list, current height — kept for fast reads
//! and for the pre-block snapshot the validator checks inputs against.

use std::collections::HashMap;

use crate::types::{utxo_key, Block};

/// A block summary kept in submission order for `list_blocks` (§4.6).
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub id: String,
    pub height: u64,
    pub tx_count: usize,
}

#[derive(Debug, Default)]
pub struct Index {
    /// `"{tx_id}:{index}"` -> `(address, value)`, present only while unspent.
    utxo: HashMap<String, (String, i64)>,
    balances: HashMap<String, i64>,
    blocks: Vec<BlockSummary>,
    current_height: u64,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_height(&self) -> u64 {
        self.current_height
    }

    pub fn balance(&self, address: &str) -> i64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn blocks(&self) -> &[BlockSummary] {
        &self.blocks
    }

    pub fn utxo_snapshot(&self) -> &HashMap<String, (String, i64)> {
        &self.utxo
    }

    pub fn utxo_set_size(&self) -> usize {
        self.utxo.len()
    }

    pub fn balances_tracked(&self) -> usize {
        self.balances.len()
    }

    /// Apply an already-validated block: remove spent UTXOs, insert new
    /// ones, update balances, advance the height, and append the block
    /// summary. Caller guarantees `block.height == current_height + 1`.
    pub fn apply_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            for input in &tx.inputs {
                let key = utxo_key(&input.tx_id, input.index);
                if let Some((address, value)) = self.utxo.remove(&key) {
                    *self.balances.entry(address).or_insert(0) -= value;
                }
            }
            for (idx, output) in tx.outputs.iter().enumerate() {
                let key = utxo_key(&tx.id, idx as u32);
                self.utxo
                    .insert(key, (output.address.clone(), output.value));
                *self.balances.entry(output.address.clone()).or_insert(0) += output.value;
            }
        }

        self.blocks.push(BlockSummary {
            id: block.id.clone(),
            height: block.height,
            tx_count: block.transactions.len(),
        });
        self.current_height = block.height;
    }

    pub fn reset(&mut self) {
        self.utxo.clear();
        self.balances.clear();
        self.blocks.clear();
        self.current_height = 0;
    }

    /// Rebuild entirely from a full list of surviving blocks, in ascending
    /// height order — the §4.5 "pure function of the surviving journal"
    /// rebuild strategy, used instead of incrementally patching state.
    pub fn rebuild_from(blocks: &[Block]) -> Self {
        let mut index = Self::new();
        for block in blocks {
            index.apply_block(block);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Input, Output, Transaction};

    fn coinbase(height: u64, tx_id: &str, address: &str, value: i64) -> Block {
        Block {
            id: format!("block-{height}"),
            height,
            transactions: vec![Transaction {
                id: tx_id.to_string(),
                inputs: vec![],
                outputs: vec![Output {
                    address: address.to_string(),
                    value,
                }],
            }],
        }
    }

    #[test]
    fn apply_block_tracks_balance_and_height() {
        let mut index = Index::new();
        index.apply_block(&coinbase(1, "tx1", "alice", 100));
        assert_eq!(index.balance("alice"), 100);
        assert_eq!(index.current_height(), 1);
        assert_eq!(index.utxo_set_size(), 1);
    }

    #[test]
    fn spending_removes_utxo_and_updates_balances() {
        let mut index = Index::new();
        index.apply_block(&coinbase(1, "tx1", "alice", 100));

        let spend = Block {
            id: "block-2".to_string(),
            height: 2,
            transactions: vec![Transaction {
                id: "tx2".to_string(),
                inputs: vec![Input {
                    tx_id: "tx1".to_string(),
                    index: 0,
                }],
                outputs: vec![Output {
                    address: "bob".to_string(),
                    value: 100,
                }],
            }],
        };
        index.apply_block(&spend);

        assert_eq!(index.balance("alice"), 0);
        assert_eq!(index.balance("bob"), 100);
        assert_eq!(index.utxo_set_size(), 1);
    }

    #[test]
    fn rebuild_from_matches_incremental_application() {
        let b1 = coinbase(1, "tx1", "alice", 100);
        let spend = Block {
            id: "block-2".to_string(),
            height: 2,
            transactions: vec![Transaction {
                id: "tx2".to_string(),
                inputs: vec![Input {
                    tx_id: "tx1".to_string(),
                    index: 0,
                }],
                outputs: vec![Output {
                    address: "bob".to_string(),
                    value: 100,
                }],
            }],
        };

        let mut incremental = Index::new();
        incremental.apply_block(&b1);
        incremental.apply_block(&spend);

        let rebuilt = Index::rebuild_from(&[b1, spend]);

        assert_eq!(incremental.balance("bob"), rebuilt.balance("bob"));
        assert_eq!(incremental.current_height(), rebuilt.current_height());
        assert_eq!(incremental.utxo_set_size(), rebuilt.utxo_set_size());
    }
}
