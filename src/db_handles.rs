use rocksdb::DB;
use std::sync::Arc;

/// The six column families a store handle must see at open time (§4.1).
pub const COLUMN_FAMILIES: [&str; 6] = [
    "blocks",
    "block_ids",
    "transactions",
    "inputs",
    "outputs",
    "balances",
];

/// Validated column family handles, so callers never `unwrap()` a
/// `cf_handle()` lookup in a hot path.
#[derive(Clone)]
pub struct DbHandles {
    db: Arc<DB>,
}

impl DbHandles {
    /// Validates that all required column families exist at startup.
    pub fn new(db: Arc<DB>) -> Result<Self, String> {
        for cf_name in COLUMN_FAMILIES {
            if db.cf_handle(cf_name).is_none() {
                return Err(format!("{cf_name} column family not found"));
            }
        }
        Ok(Self { db })
    }

    pub fn db(&self) -> &Arc<DB> {
        &self.db
    }
}
