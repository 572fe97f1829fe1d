//! Layered configuration: an optional `config/default.toml` file,
//! overridden by `APP__*` environment variables. Mirrors the
//! `config`-crate settings pattern used elsewhere in the pack
//! (`engine/src/settings.rs`), generalized from a single node URL to the
//! full set the engine needs to operate headlessly.

use config::{Config as ConfigSource, ConfigError, Environment, File};
use serde::Deserialize;

fn default_max_retries() -> u32 {
    5
}

fn default_tick_interval_ms() -> u64 {
    250
}

/// One signing account: its chain address and the seed/URI used to
/// derive its sr25519 key pair (e.g. `"//Alice"`, or a raw mnemonic).
#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub address: String,
    pub seed: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub node_url: String,
    pub accounts: Vec<AccountConfig>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        ConfigSource::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_not_overridden() {
        // exercised indirectly via `Settings::load` in integration tests;
        // this just checks the default fns used by serde(default).
        assert_eq!(default_max_retries(), 5);
        assert_eq!(default_tick_interval_ms(), 250);
    }
}
