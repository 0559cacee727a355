//! Endpoint configuration for the JSON-RPC adapter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where and how to reach the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpointConfig {
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,
    /// WebSocket pub/sub endpoint. `None` disables the live feed.
    pub ws_url: Option<String>,
    /// Commitment level passed to every request.
    pub commitment: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for RpcEndpointConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.devnet.solana.com".to_string(),
            ws_url: Some("wss://api.devnet.solana.com".to_string()),
            commitment: "confirmed".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}
