//! Layered configuration: `config.toml` plus environment overrides, loaded
//! once into a process-wide [`OnceCell`].

pub use config::Config;
pub use once_cell::sync::OnceCell;
use std::error::Error;

static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

/// Resolved, ready-to-use settings — the shape the rest of the crate reads
/// from, as opposed to the raw layered `Config`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

fn build_layered_config() -> Result<Config, config::ConfigError> {
    Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 3000)?
        .set_default("logging.level", "info")?
        .set_default("paths.db_path", "./data/utxo-indexer")?
        .add_source(config::File::with_name("config.toml").required(false))
        .add_source(config::Environment::default().separator("__"))
        .build()
}

/// Load and validate settings into [`AppConfig`]. `DATABASE_URL`, if set,
/// wins over `paths.db_path` from `config.toml` (spec §6).
fn resolve(config: &Config) -> Result<AppConfig, Box<dyn Error>> {
    let db_path = std::env::var("DATABASE_URL")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| config.get_string("paths.db_path").ok())
        .ok_or("no database location: set DATABASE_URL or paths.db_path")?;

    let host = config.get_string("server.host")?;
    let port: u16 = config
        .get_string("server.port")?
        .parse()
        .map_err(|_| "server.port is not a valid u16")?;
    let log_level = config.get_string("logging.level")?;

    Ok(AppConfig {
        db_path,
        host,
        port,
        log_level,
    })
}

/// Load layered config, resolve it, and store it in the global cell. Must be
/// called exactly once, before [`get_global_config`].
pub fn init_global_config() -> Result<(), Box<dyn Error>> {
    let raw = build_layered_config()?;
    let resolved = resolve(&raw)?;
    GLOBAL_CONFIG
        .set(resolved)
        .map_err(|_| "config already initialized")?;
    Ok(())
}

pub fn get_global_config() -> &'static AppConfig {
    GLOBAL_CONFIG.get().unwrap_or_else(|| {
        eprintln!("FATAL: config not initialized — call init_global_config() first");
        std::process::exit(1);
    })
}

/// Load config for standalone binaries (e.g. `inspect-db`) without touching
/// the global cell.
pub fn load_config() -> Result<AppConfig, Box<dyn Error>> {
    let raw = build_layered_config()?;
    resolve(&raw)
}
