//! Pure, side-effect-free block validation (§4.3). Given a candidate block
//! and a snapshot of the current UTXO set, decides accept/reject without
//! touching the store or the in-memory index.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::ChainError;
use crate::types::{utxo_key, Block};

/// Compute the block id: lowercase hex SHA-256 of `height` (decimal) followed
/// by the concatenation of transaction ids in submission order. Order- and
/// boundary-sensitive by design — see the hash-input ambiguity note (§9):
/// this is *not* length-prefixed, so `("1", ["ab"])` and `("1a", ["b"])`
/// hash identically. That collision is preserved, not patched.
pub fn compute_block_id(height: u64, tx_ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(height.to_string().as_bytes());
    for id in tx_ids {
        hasher.update(id.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Validate `candidate` against `current_height` and a snapshot of the
/// UTXO set (`address, value` keyed by `"{tx_id}:{index}"`), frozen at the
/// top of validation. Runs the four checks in order; the first failure
/// wins and no partial result is returned.
pub fn validate_block(
    candidate: &Block,
    current_height: u64,
    utxo_snapshot: &HashMap<String, (String, i64)>,
) -> Result<(), ChainError> {
    let expected_height = current_height + 1;
    if candidate.height != expected_height {
        return Err(ChainError::InvalidHeight {
            expected: expected_height,
            received: candidate.height,
        });
    }

    // Pass 1: UTXO existence across *every* transaction's inputs, before any
    // transaction's value conservation is checked (§4.3 orders check 2 ahead
    // of check 3 for the whole block, not per transaction). Each tx's
    // in_sum is accumulated here since the lookup already has the value.
    let mut in_sums: Vec<i64> = Vec::with_capacity(candidate.transactions.len());
    for tx in &candidate.transactions {
        if tx.is_coinbase() {
            in_sums.push(0);
            continue;
        }

        let mut in_sum: i64 = 0;
        for input in &tx.inputs {
            let key = utxo_key(&input.tx_id, input.index);
            match utxo_snapshot.get(&key) {
                Some((_address, value)) => in_sum += value,
                None => return Err(ChainError::InputNotFound { key }),
            }
        }
        in_sums.push(in_sum);
    }

    // Pass 2: value conservation, now that every input is known to exist.
    for (tx, in_sum) in candidate.transactions.iter().zip(in_sums) {
        if tx.is_coinbase() {
            continue;
        }

        let out_sum: i64 = tx.outputs.iter().map(|o| o.value).sum();
        if in_sum != out_sum {
            return Err(ChainError::ValueMismatch {
                tx_id: tx.id.clone(),
                in_sum,
                out_sum,
            });
        }
    }

    let tx_ids: Vec<String> = candidate.transactions.iter().map(|t| t.id.clone()).collect();
    let expected_id = compute_block_id(candidate.height, &tx_ids);
    if candidate.id != expected_id {
        let mut hash_input = candidate.height.to_string();
        hash_input.push_str(&tx_ids.concat());
        return Err(ChainError::InvalidBlockId {
            expected: expected_id,
            received: candidate.id.clone(),
            hash_input,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Input, Output, Transaction};

    fn coinbase(id: &str, address: &str, value: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            inputs: vec![],
            outputs: vec![Output {
                address: address.to_string(),
                value,
            }],
        }
    }

    #[test]
    fn block_id_matches_sha256_of_height_and_tx_ids() {
        let id = compute_block_id(1, &["tx1".to_string()]);
        let mut hasher = Sha256::new();
        hasher.update(b"1");
        hasher.update(b"tx1");
        assert_eq!(id, hex::encode(hasher.finalize()));
    }

    #[test]
    fn rejects_wrong_height() {
        let tx = coinbase("tx1", "alice", 100);
        let id = compute_block_id(5, &["tx1".to_string()]);
        let block = Block {
            id,
            height: 5,
            transactions: vec![tx],
        };
        let err = validate_block(&block, 0, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ChainError::InvalidHeight { expected: 1, received: 5 }));
    }

    #[test]
    fn accepts_coinbase_only_block() {
        let tx = coinbase("tx1", "alice", 100);
        let id = compute_block_id(1, &["tx1".to_string()]);
        let block = Block {
            id,
            height: 1,
            transactions: vec![tx],
        };
        assert!(validate_block(&block, 0, &HashMap::new()).is_ok());
    }

    #[test]
    fn rejects_spend_of_unknown_input() {
        let tx = Transaction {
            id: "tx2".to_string(),
            inputs: vec![Input {
                tx_id: "ghost".to_string(),
                index: 0,
            }],
            outputs: vec![Output {
                address: "bob".to_string(),
                value: 10,
            }],
        };
        let id = compute_block_id(1, &["tx2".to_string()]);
        let block = Block {
            id,
            height: 1,
            transactions: vec![tx],
        };
        let err = validate_block(&block, 0, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ChainError::InputNotFound { .. }));
    }

    #[test]
    fn rejects_value_mismatch() {
        let mut snapshot = HashMap::new();
        snapshot.insert("tx1:0".to_string(), ("alice".to_string(), 100));
        let tx = Transaction {
            id: "tx2".to_string(),
            inputs: vec![Input {
                tx_id: "tx1".to_string(),
                index: 0,
            }],
            outputs: vec![Output {
                address: "bob".to_string(),
                value: 999,
            }],
        };
        let id = compute_block_id(1, &["tx2".to_string()]);
        let block = Block {
            id,
            height: 1,
            transactions: vec![tx],
        };
        let err = validate_block(&block, 0, &snapshot).unwrap_err();
        assert!(matches!(err, ChainError::ValueMismatch { .. }));
    }

    #[test]
    fn rejects_spend_of_output_produced_earlier_in_same_block() {
        // The snapshot is captured before the block starts, so a tx spending
        // an output minted by an earlier tx in the same block must fail.
        let earlier = coinbase("tx1", "alice", 50);
        let spender = Transaction {
            id: "tx2".to_string(),
            inputs: vec![Input {
                tx_id: "tx1".to_string(),
                index: 0,
            }],
            outputs: vec![Output {
                address: "bob".to_string(),
                value: 50,
            }],
        };
        let id = compute_block_id(1, &["tx1".to_string(), "tx2".to_string()]);
        let block = Block {
            id,
            height: 1,
            transactions: vec![earlier, spender],
        };
        let err = validate_block(&block, 0, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ChainError::InputNotFound { .. }));
    }

    #[test]
    fn existence_check_runs_across_the_whole_block_before_any_value_check() {
        // tx1 spends a real UTXO but has a mismatched sum; tx2 spends a UTXO
        // that doesn't exist. Existence must be checked for every tx's
        // inputs before any tx's conservation is checked, so the block is
        // rejected for tx2's missing input, not tx1's bad sum.
        let mut snapshot = HashMap::new();
        snapshot.insert("prev:0".to_string(), ("alice".to_string(), 100));

        let tx1 = Transaction {
            id: "tx1".to_string(),
            inputs: vec![Input {
                tx_id: "prev".to_string(),
                index: 0,
            }],
            outputs: vec![Output {
                address: "bob".to_string(),
                value: 999,
            }],
        };
        let tx2 = Transaction {
            id: "tx2".to_string(),
            inputs: vec![Input {
                tx_id: "ghost".to_string(),
                index: 0,
            }],
            outputs: vec![Output {
                address: "carol".to_string(),
                value: 1,
            }],
        };
        let id = compute_block_id(1, &["tx1".to_string(), "tx2".to_string()]);
        let block = Block {
            id,
            height: 1,
            transactions: vec![tx1, tx2],
        };
        let err = validate_block(&block, 0, &snapshot).unwrap_err();
        assert!(matches!(err, ChainError::InputNotFound { key } if key == "ghost:0"));
    }

    #[test]
    fn rejects_bad_block_id() {
        let tx = coinbase("tx1", "alice", 100);
        let block = Block {
            id: "not-the-right-hash".to_string(),
            height: 1,
            transactions: vec![tx],
        };
        let err = validate_block(&block, 0, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ChainError::InvalidBlockId { .. }));
    }
}
