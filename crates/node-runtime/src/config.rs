//! # Sync Configuration
//!
//! Unified configuration for every subsystem.
//!
//! ## Load Order
//!
//! 1. Defaults
//! 2. Optional TOML file (`--config`)
//! 3. Environment overrides (`SOLPLAY_*`)
//! 4. [`SyncConfig::validate`]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::Address;
use sp_01_ledger_reader::RpcEndpointConfig;
use sp_04_ingestion::IngestionConfig;
use sp_05_chunk_tracker::TrackerConfig;
use sp_06_settlement::{SettlementConfig, BASIS_POINTS};
use sp_07_api_gateway::HttpConfig;
use thiserror::Error;

pub const ENV_RPC_URL: &str = "SOLPLAY_RPC_URL";
pub const ENV_WS_URL: &str = "SOLPLAY_WS_URL";
pub const ENV_PROGRAM_ID: &str = "SOLPLAY_PROGRAM_ID";
pub const ENV_DATABASE: &str = "SOLPLAY_DATABASE";
pub const ENV_HTTP_ADDR: &str = "SOLPLAY_HTTP_ADDR";

/// Database path that selects a private in-memory store.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub ledger: LedgerConfig,
    pub ingestion: IngestionConfig,
    pub settlement: SettlementConfig,
    pub tracker: TrackerConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
}

/// Ledger endpoint and watched program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Empty disables the live feed.
    pub ws_url: Option<String>,
    /// Base58 program id.
    pub program_id: String,
    pub commitment: String,
    pub request_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let endpoint = RpcEndpointConfig::default();
        Self {
            rpc_url: endpoint.rpc_url,
            ws_url: endpoint.ws_url,
            program_id: String::new(),
            commitment: endpoint.commitment,
            request_timeout_secs: endpoint.request_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file, or `:memory:`.
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/solplay-mirror.db"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid program id {value:?}: {reason}")]
    ProgramId { value: String, reason: String },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SyncConfig {
    /// Defaults, then the file if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `SOLPLAY_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.ledger.rpc_url = url;
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            self.ledger.ws_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(id) = lookup(ENV_PROGRAM_ID) {
            self.ledger.program_id = id;
        }
        if let Some(path) = lookup(ENV_DATABASE) {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup(ENV_HTTP_ADDR) {
            self.http.bind_address = addr;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.program_id()?;

        let rpc = self.ledger.rpc_url.trim();
        if !(rpc.starts_with("http://") || rpc.starts_with("https://")) {
            return Err(invalid("ledger.rpc_url", "must be an http(s) URL"));
        }
        if let Some(ws) = &self.ledger.ws_url {
            if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
                return Err(invalid("ledger.ws_url", "must be a ws(s) URL"));
            }
        }
        if self.ledger.request_timeout_secs == 0 {
            return Err(invalid("ledger.request_timeout_secs", "must be positive"));
        }
        if self.ingestion.poll_interval_secs == 0 {
            return Err(invalid("ingestion.poll_interval_secs", "must be positive"));
        }
        if self.ingestion.max_retry_attempts == 0 {
            return Err(invalid("ingestion.max_retry_attempts", "must be positive"));
        }
        if !(1..=1_000).contains(&self.ingestion.signature_page_size) {
            return Err(invalid(
                "ingestion.signature_page_size",
                "must be between 1 and 1000",
            ));
        }
        if u64::from(self.settlement.platform_fee_bps) > BASIS_POINTS {
            return Err(invalid(
                "settlement.platform_fee_bps",
                "must not exceed 10000",
            ));
        }
        if self.settlement.client_settle_timeout_secs == 0 {
            return Err(invalid(
                "settlement.client_settle_timeout_secs",
                "must be positive",
            ));
        }
        if self.tracker.settlement_threshold == 0 {
            return Err(invalid("tracker.settlement_threshold", "must be positive"));
        }
        self.http
            .socket_addr()
            .map_err(|e| invalid("http.bind_address", e.to_string()))?;
        Ok(())
    }

    pub fn program_id(&self) -> Result<Address, ConfigError> {
        self.ledger
            .program_id
            .trim()
            .parse()
            .map_err(|e: shared_types::ParseError| ConfigError::ProgramId {
                value: self.ledger.program_id.clone(),
                reason: e.to_string(),
            })
    }

    pub fn rpc_endpoint(&self) -> RpcEndpointConfig {
        RpcEndpointConfig {
            rpc_url: self.ledger.rpc_url.clone(),
            ws_url: self.ledger.ws_url.clone(),
            commitment: self.ledger.commitment.clone(),
            request_timeout: Duration::from_secs(self.ledger.request_timeout_secs),
        }
    }

    pub fn uses_in_memory_store(&self) -> bool {
        self.storage.database_path.as_os_str() == IN_MEMORY_DATABASE
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PROGRAM: &str = "11111111111111111111111111111111";

    fn valid() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.ledger.program_id = PROGRAM.into();
        config
    }

    #[test]
    fn test_defaults_need_a_program_id() {
        assert!(matches!(
            SyncConfig::default().validate(),
            Err(ConfigError::ProgramId { .. })
        ));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            [ledger]
            program_id = "11111111111111111111111111111111"

            [ingestion]
            poll_interval_secs = 5

            [settlement]
            platform_fee_bps = 300
            "#,
        )
        .unwrap();
        assert_eq!(config.ingestion.poll_interval_secs, 5);
        assert_eq!(config.ingestion.max_retry_attempts, 5);
        assert_eq!(config.settlement.platform_fee_bps, 300);
        assert_eq!(config.tracker.settlement_threshold, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = [
            (ENV_RPC_URL, "http://localhost:8899"),
            (ENV_WS_URL, ""),
            (ENV_PROGRAM_ID, PROGRAM),
            (ENV_DATABASE, IN_MEMORY_DATABASE),
            (ENV_HTTP_ADDR, "0.0.0.0:9000"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.ledger.rpc_url, "http://localhost:8899");
        assert_eq!(config.ledger.ws_url, None);
        assert!(config.uses_in_memory_store());
        assert_eq!(config.http.bind_address, "0.0.0.0:9000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = valid();
        config.settlement.platform_fee_bps = 10_001;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "settlement.platform_fee_bps",
                ..
            })
        ));

        let mut config = valid();
        config.ledger.rpc_url = "ftp://nope".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.http.bind_address = "localhost".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rpc_endpoint_mapping() {
        let mut config = valid();
        config.ledger.request_timeout_secs = 7;
        let endpoint = config.rpc_endpoint();
        assert_eq!(endpoint.request_timeout, Duration::from_secs(7));
        assert_eq!(endpoint.rpc_url, config.ledger.rpc_url);
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let example = include_str!("../../../solplay-sync.example.toml");
        assert_eq!(SyncConfig::from_toml(example).unwrap(), SyncConfig::default());
    }
}
