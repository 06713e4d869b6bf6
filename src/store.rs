//! Persistent store (C1, §4.1): RocksDB column families backing the five
//! logical relations, written through a single [`WriteBatch`] per mutating
//! call so the store is never observed half-updated.

use std::collections::HashMap;
use std::sync::Arc;

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};

use crate::db_handles::{DbHandles, COLUMN_FAMILIES};
use crate::error::ChainError;
use crate::types::{utxo_key, Block, StoredBlock, StoredOutput, StoredTransaction};

pub struct Store {
    db: Arc<DB>,
}

fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

impl Store {
    /// Open (or create) the RocksDB database at `path` with all six column
    /// families present.
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let mut cf_descriptors = vec![ColumnFamilyDescriptor::new(
            "default",
            Options::default(),
        )];
        for cf in COLUMN_FAMILIES {
            cf_descriptors.push(ColumnFamilyDescriptor::new(cf, Options::default()));
        }

        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        db_options.create_missing_column_families(true);

        let db = DB::open_cf_descriptors(&db_options, path, cf_descriptors)
            .map_err(|e| ChainError::StoreError(e.to_string()))?;
        let db = Arc::new(db);

        DbHandles::new(db.clone()).map_err(ChainError::StoreError)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, ChainError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ChainError::StoreError(format!("missing column family: {name}")))
    }

    /// Apply a validated block: one `WriteBatch` spanning every touched
    /// column family (blocks, block_ids, transactions, inputs, outputs,
    /// balances).
    pub fn apply_block(&self, block: &Block) -> Result<(), ChainError> {
        let cf_blocks = self.cf("blocks")?;
        let cf_block_ids = self.cf("block_ids")?;
        let cf_transactions = self.cf("transactions")?;
        let cf_inputs = self.cf("inputs")?;
        let cf_outputs = self.cf("outputs")?;
        let cf_balances = self.cf("balances")?;

        let mut batch = WriteBatch::default();
        let mut balance_deltas: HashMap<String, i64> = HashMap::new();

        for tx in &block.transactions {
            for input in &tx.inputs {
                let key = utxo_key(&input.tx_id, input.index);
                let raw = self
                    .db
                    .get_cf(cf_outputs, key.as_bytes())
                    .map_err(|e| ChainError::StoreError(e.to_string()))?
                    .ok_or_else(|| ChainError::InputNotFound { key: key.clone() })?;
                let mut stored: StoredOutput = bincode::deserialize(&raw)
                    .map_err(|e| ChainError::StoreError(e.to_string()))?;
                stored.is_spent = true;
                *balance_deltas.entry(stored.address.clone()).or_insert(0) -= stored.value;

                let encoded =
                    bincode::serialize(&stored).map_err(|e| ChainError::StoreError(e.to_string()))?;
                batch.put_cf(cf_outputs, key.as_bytes(), encoded);

                let input_key = format!("{}:{}", tx.id, input.index);
                let spend_record = bincode::serialize(&(input.tx_id.clone(), input.index))
                    .map_err(|e| ChainError::StoreError(e.to_string()))?;
                batch.put_cf(cf_inputs, input_key.as_bytes(), spend_record);
            }

            for (idx, output) in tx.outputs.iter().enumerate() {
                let key = utxo_key(&tx.id, idx as u32);
                let stored = StoredOutput {
                    address: output.address.clone(),
                    value: output.value,
                    is_spent: false,
                };
                let encoded =
                    bincode::serialize(&stored).map_err(|e| ChainError::StoreError(e.to_string()))?;
                batch.put_cf(cf_outputs, key.as_bytes(), encoded);
                *balance_deltas.entry(output.address.clone()).or_insert(0) += output.value;
            }

            let stored_tx = StoredTransaction {
                block_id: block.id.clone(),
                inputs: tx.inputs.clone(),
                outputs: tx.outputs.clone(),
            };
            let encoded =
                bincode::serialize(&stored_tx).map_err(|e| ChainError::StoreError(e.to_string()))?;
            batch.put_cf(cf_transactions, tx.id.as_bytes(), encoded);
        }

        for (address, delta) in balance_deltas {
            let current = self.read_balance(&address)?;
            let updated = current + delta;
            batch.put_cf(cf_balances, address.as_bytes(), updated.to_le_bytes());
        }

        let tx_ids: Vec<String> = block.transactions.iter().map(|t| t.id.clone()).collect();
        let stored_block = StoredBlock {
            id: block.id.clone(),
            height: block.height,
            tx_ids,
        };
        let encoded =
            bincode::serialize(&stored_block).map_err(|e| ChainError::StoreError(e.to_string()))?;
        batch.put_cf(cf_blocks, height_key(block.height), encoded);
        batch.put_cf(cf_block_ids, block.id.as_bytes(), height_key(block.height));

        self.db
            .write(batch)
            .map_err(|e| ChainError::StoreError(e.to_string()))
    }

    fn read_balance(&self, address: &str) -> Result<i64, ChainError> {
        let cf = self.cf("balances")?;
        match self
            .db
            .get_cf(cf, address.as_bytes())
            .map_err(|e| ChainError::StoreError(e.to_string()))?
        {
            Some(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes[..8]);
                Ok(i64::from_le_bytes(buf))
            }
            None => Ok(0),
        }
    }

    pub fn balance(&self, address: &str) -> Result<i64, ChainError> {
        self.read_balance(address)
    }

    /// All blocks in ascending height order, for startup recovery and
    /// full-replay rebuilds.
    pub fn list_blocks(&self) -> Result<Vec<StoredBlock>, ChainError> {
        let cf = self.cf("blocks")?;
        let mut out = Vec::new();
        let iter = self.db.iterator_cf(cf, rocksdb::IteratorMode::Start);
        for item in iter {
            let (_key, value) = item.map_err(|e| ChainError::StoreError(e.to_string()))?;
            let stored: StoredBlock =
                bincode::deserialize(&value).map_err(|e| ChainError::StoreError(e.to_string()))?;
            out.push(stored);
        }
        Ok(out)
    }

    pub fn current_height(&self) -> Result<u64, ChainError> {
        Ok(self.list_blocks()?.last().map(|b| b.height).unwrap_or(0))
    }

    pub fn get_transaction(&self, tx_id: &str) -> Result<Option<StoredTransaction>, ChainError> {
        let cf = self.cf("transactions")?;
        match self
            .db
            .get_cf(cf, tx_id.as_bytes())
            .map_err(|e| ChainError::StoreError(e.to_string()))?
        {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| ChainError::StoreError(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Reconstruct every surviving block as a full [`Block`] (inputs and
    /// outputs included), in ascending height order — the input to a
    /// full-replay rebuild of the in-memory index (§4.5).
    pub fn reconstruct_blocks(&self) -> Result<Vec<Block>, ChainError> {
        let mut out = Vec::new();
        for stored_block in self.list_blocks()? {
            let mut transactions = Vec::with_capacity(stored_block.tx_ids.len());
            for tx_id in &stored_block.tx_ids {
                let stored_tx = self.get_transaction(tx_id)?.ok_or_else(|| {
                    ChainError::StoreError(format!("missing transaction {tx_id} referenced by block {}", stored_block.id))
                })?;
                transactions.push(crate::types::Transaction {
                    id: tx_id.clone(),
                    inputs: stored_tx.inputs,
                    outputs: stored_tx.outputs,
                });
            }
            out.push(Block {
                id: stored_block.id,
                height: stored_block.height,
                transactions,
            });
        }
        Ok(out)
    }

    /// Roll the store back to `target_height` (§4.5): unspend inputs whose
    /// spender is being undone but whose producing output survives, delete
    /// doomed outputs/transactions/blocks, then recompute every touched
    /// balance by a full scan of surviving outputs.
    pub fn rewind_to(&self, target_height: u64) -> Result<(), ChainError> {
        let cf_blocks = self.cf("blocks")?;
        let cf_block_ids = self.cf("block_ids")?;
        let cf_transactions = self.cf("transactions")?;
        let cf_inputs = self.cf("inputs")?;
        let cf_outputs = self.cf("outputs")?;
        let cf_balances = self.cf("balances")?;

        let all_blocks = self.list_blocks()?;
        let doomed: Vec<&StoredBlock> = all_blocks
            .iter()
            .filter(|b| b.height > target_height)
            .collect();

        let mut batch = WriteBatch::default();
        let mut touched_addresses: std::collections::HashSet<String> =
            std::collections::HashSet::new();

        for block in doomed.iter().rev() {
            for tx_id in block.tx_ids.iter().rev() {
                let raw = self
                    .db
                    .get_cf(cf_transactions, tx_id.as_bytes())
                    .map_err(|e| ChainError::StoreError(e.to_string()))?;
                let stored_tx: Option<StoredTransaction> = match raw {
                    Some(bytes) => Some(
                        bincode::deserialize(&bytes)
                            .map_err(|e| ChainError::StoreError(e.to_string()))?,
                    ),
                    None => None,
                };

                if let Some(stored_tx) = &stored_tx {
                    for input in &stored_tx.inputs {
                        let key = utxo_key(&input.tx_id, input.index);
                        if let Some(raw_out) = self
                            .db
                            .get_cf(cf_outputs, key.as_bytes())
                            .map_err(|e| ChainError::StoreError(e.to_string()))?
                        {
                            let mut stored: StoredOutput = bincode::deserialize(&raw_out)
                                .map_err(|e| ChainError::StoreError(e.to_string()))?;
                            stored.is_spent = false;
                            touched_addresses.insert(stored.address.clone());
                            let encoded = bincode::serialize(&stored)
                                .map_err(|e| ChainError::StoreError(e.to_string()))?;
                            batch.put_cf(cf_outputs, key.as_bytes(), encoded);
                        }
                        let input_key = format!("{tx_id}:{}", input.index);
                        batch.delete_cf(cf_inputs, input_key.as_bytes());
                    }

                    for (idx, output) in stored_tx.outputs.iter().enumerate() {
                        let key = utxo_key(tx_id, idx as u32);
                        touched_addresses.insert(output.address.clone());
                        batch.delete_cf(cf_outputs, key.as_bytes());
                    }
                }

                batch.delete_cf(cf_transactions, tx_id.as_bytes());
            }

            batch.delete_cf(cf_blocks, height_key(block.height));
            batch.delete_cf(cf_block_ids, block.id.as_bytes());
        }

        // Recompute every touched balance from the surviving outputs,
        // rather than patching deltas incrementally.
        for address in &touched_addresses {
            batch.delete_cf(cf_balances, address.as_bytes());
        }

        self.db
            .write(batch)
            .map_err(|e| ChainError::StoreError(e.to_string()))?;

        self.recompute_balances(&touched_addresses)
    }

    fn recompute_balances(
        &self,
        addresses: &std::collections::HashSet<String>,
    ) -> Result<(), ChainError> {
        if addresses.is_empty() {
            return Ok(());
        }
        let cf_outputs = self.cf("outputs")?;
        let cf_balances = self.cf("balances")?;

        let mut totals: HashMap<String, i64> = HashMap::new();
        let iter = self.db.iterator_cf(cf_outputs, rocksdb::IteratorMode::Start);
        for item in iter {
            let (_key, value) = item.map_err(|e| ChainError::StoreError(e.to_string()))?;
            let stored: StoredOutput =
                bincode::deserialize(&value).map_err(|e| ChainError::StoreError(e.to_string()))?;
            if stored.is_spent || !addresses.contains(&stored.address) {
                continue;
            }
            *totals.entry(stored.address.clone()).or_insert(0) += stored.value;
        }

        let mut batch = WriteBatch::default();
        for address in addresses {
            let total = totals.get(address).copied().unwrap_or(0);
            batch.put_cf(cf_balances, address.as_bytes(), total.to_le_bytes());
        }
        self.db
            .write(batch)
            .map_err(|e| ChainError::StoreError(e.to_string()))
    }

    /// Wipe every column family back to genesis.
    pub fn reset(&self) -> Result<(), ChainError> {
        let mut batch = WriteBatch::default();
        for cf_name in COLUMN_FAMILIES {
            let cf = self.cf(cf_name)?;
            let iter = self.db.iterator_cf(cf, rocksdb::IteratorMode::Start);
            for item in iter {
                let (key, _value) = item.map_err(|e| ChainError::StoreError(e.to_string()))?;
                batch.delete_cf(cf, key);
            }
        }
        self.db
            .write(batch)
            .map_err(|e| ChainError::StoreError(e.to_string()))
    }
}
