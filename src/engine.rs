//! The engine (§5): ties the persistent store, the in-memory index, and the
//! validator together behind a single lock so mutating operations never
//! interleave.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::error::ChainError;
use crate::index::{BlockSummary, Index};
use crate::metrics;
use crate::store::Store;
use crate::types::Block;
use crate::validator;

pub struct Engine {
    store: Arc<Store>,
    state: Mutex<Index>,
}

impl Engine {
    /// Build the engine, recovering the in-memory index from whatever the
    /// store already holds (startup after a restart).
    pub fn new(store: Arc<Store>) -> Result<Self, ChainError> {
        let blocks = store.reconstruct_blocks()?;
        let index = Index::rebuild_from(&blocks);
        metrics::CURRENT_HEIGHT.set(index.current_height() as i64);
        metrics::UTXO_SET_SIZE.set(index.utxo_set_size() as i64);
        metrics::BALANCES_TRACKED.set(index.balances_tracked() as i64);
        Ok(Self {
            store,
            state: Mutex::new(index),
        })
    }

    /// Validate and, on success, apply `block` to the store then the index,
    /// under one lock (§3/§5). Rejections never touch either.
    #[instrument(skip(self, block), fields(height = block.height, id = %block.id))]
    pub async fn submit_block(&self, block: Block) -> Result<BlockSummary, ChainError> {
        let mut state = self.state.lock().await;

        let result = validator::validate_block(
            &block,
            state.current_height(),
            state.utxo_snapshot(),
        );

        if let Err(err) = result {
            let reason = rejection_reason(&err);
            metrics::BLOCKS_REJECTED.with_label_values(&[reason]).inc();
            warn!(reason, "block rejected");
            return Err(err);
        }

        let store = self.store.clone();
        let block_for_store = block.clone();
        tokio::task::spawn_blocking(move || store.apply_block(&block_for_store))
            .await
            .map_err(|e| ChainError::StoreError(e.to_string()))??;

        state.apply_block(&block);

        metrics::BLOCKS_ACCEPTED.inc();
        metrics::CURRENT_HEIGHT.set(state.current_height() as i64);
        metrics::UTXO_SET_SIZE.set(state.utxo_set_size() as i64);
        metrics::BALANCES_TRACKED.set(state.balances_tracked() as i64);
        info!(height = block.height, "block accepted");

        Ok(state.blocks().last().cloned().expect("just pushed"))
    }

    /// Roll the chain back to `target_height` (§4.5): store-level undo,
    /// then a full in-memory rebuild from the surviving journal.
    #[instrument(skip(self))]
    pub async fn rollback(&self, target_height: u64) -> Result<u64, ChainError> {
        if target_height < 1 {
            return Err(ChainError::InvalidHeightParam {
                received: target_height.to_string(),
            });
        }

        let mut state = self.state.lock().await;
        let current = state.current_height();

        if target_height > current {
            return Err(ChainError::TargetAboveHead {
                target: target_height,
                current,
            });
        }

        let depth = current - target_height;

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.rewind_to(target_height))
            .await
            .map_err(|e| ChainError::StoreError(e.to_string()))??;

        let blocks = self.store.reconstruct_blocks()?;
        *state = Index::rebuild_from(&blocks);

        metrics::ROLLBACK_DEPTH.observe(depth as f64);
        metrics::CURRENT_HEIGHT.set(state.current_height() as i64);
        metrics::UTXO_SET_SIZE.set(state.utxo_set_size() as i64);
        metrics::BALANCES_TRACKED.set(state.balances_tracked() as i64);
        info!(target_height, depth, "rolled back");

        Ok(state.current_height())
    }

    /// Wipe the store and the index back to genesis.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<(), ChainError> {
        let mut state = self.state.lock().await;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.reset())
            .await
            .map_err(|e| ChainError::StoreError(e.to_string()))??;
        state.reset();

        metrics::CURRENT_HEIGHT.set(0);
        metrics::UTXO_SET_SIZE.set(0);
        metrics::BALANCES_TRACKED.set(0);
        info!("reset to genesis");
        Ok(())
    }

    pub async fn balance(&self, address: &str) -> i64 {
        self.state.lock().await.balance(address)
    }

    pub async fn list_blocks(&self) -> Vec<BlockSummary> {
        self.state.lock().await.blocks().to_vec()
    }
}

fn rejection_reason(err: &ChainError) -> &'static str {
    match err {
        ChainError::InvalidHeight { .. } => "invalid_height",
        ChainError::InputNotFound { .. } => "input_not_found",
        ChainError::ValueMismatch { .. } => "value_mismatch",
        ChainError::InvalidBlockId { .. } => "invalid_block_id",
        ChainError::InvalidHeightParam { .. } => "invalid_height_param",
        ChainError::TargetAboveHead { .. } => "target_above_head",
        ChainError::StoreError(_) => "store_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Input, Output, Transaction};
    use tempfile::TempDir;

    fn coinbase_block(height: u64, tx_id: &str, address: &str, value: i64) -> Block {
        let id = validator::compute_block_id(height, &[tx_id.to_string()]);
        Block {
            id,
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

    async fn new_engine() -> (Engine, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().to_str().unwrap()).unwrap());
        let engine = Engine::new(store).unwrap();
        (engine, dir)
    }

    #[tokio::test]
    async fn submit_accepts_first_block_at_height_one() {
        let (engine, _dir) = new_engine().await;
        let block = coinbase_block(1, "tx1", "alice", 100);
        engine.submit_block(block).await.unwrap();
        assert_eq!(engine.balance("alice").await, 100);
        assert_eq!(engine.list_blocks().await.len(), 1);
    }

    #[tokio::test]
    async fn submit_rejects_out_of_order_height() {
        let (engine, _dir) = new_engine().await;
        let block = coinbase_block(2, "tx1", "alice", 100);
        let err = engine.submit_block(block).await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidHeight { .. }));
    }

    #[tokio::test]
    async fn rollback_restores_prior_state() {
        let (engine, _dir) = new_engine().await;
        engine
            .submit_block(coinbase_block(1, "tx1", "alice", 100))
            .await
            .unwrap();

        let spend = Block {
            id: validator::compute_block_id(2, &["tx2".to_string()]),
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
        engine.submit_block(spend).await.unwrap();

        engine.rollback(1).await.unwrap();
        assert_eq!(engine.balance("alice").await, 100);
        assert_eq!(engine.balance("bob").await, 0);
        assert_eq!(engine.list_blocks().await.len(), 1);

        // the chain must accept height 2 again after the rollback
        engine
            .submit_block(coinbase_block(2, "tx3", "carol", 5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rollback_above_head_is_rejected() {
        let (engine, _dir) = new_engine().await;
        engine
            .submit_block(coinbase_block(1, "tx1", "alice", 100))
            .await
            .unwrap();
        let err = engine.rollback(5).await.unwrap_err();
        assert!(matches!(err, ChainError::TargetAboveHead { .. }));
    }

    #[tokio::test]
    async fn rollback_to_zero_is_rejected_at_the_engine_level() {
        let (engine, _dir) = new_engine().await;
        engine
            .submit_block(coinbase_block(1, "tx1", "alice", 100))
            .await
            .unwrap();
        let err = engine.rollback(0).await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidHeightParam { .. }));
        // state must be untouched
        assert_eq!(engine.balance("alice").await, 100);
        assert_eq!(engine.list_blocks().await.len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let (engine, _dir) = new_engine().await;
        engine
            .submit_block(coinbase_block(1, "tx1", "alice", 100))
            .await
            .unwrap();
        engine.reset().await.unwrap();
        assert_eq!(engine.balance("alice").await, 0);
        assert_eq!(engine.list_blocks().await.len(), 0);
    }
}
