//! Standalone diagnostic: open the store read-only and print a chain-state
//! summary. Grounded on the teacher's `check_db` diagnostics binary.

use utxo_indexer::config::load_config;
use utxo_indexer::store::Store;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = Store::open(&config.db_path)?;

    let height = store.current_height()?;
    let blocks = store.list_blocks()?;

    println!("db path: {}", config.db_path);
    println!("current height: {height}");
    println!("blocks stored: {}", blocks.len());

    if let Some(tip) = blocks.last() {
        println!("tip block id: {}", tip.id);
        println!("tip tx count: {}", tip.tx_ids.len());
    }

    Ok(())
}
