//! # HTTP Configuration

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address, `host:port`.
    pub bind_address: String,
    /// Requests running longer than this are answered with 408.
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_address.parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8402".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_address_parses() {
        let addr = HttpConfig::default().socket_addr().unwrap();
        assert_eq!(addr.port(), 8402);
    }

    #[test]
    fn test_bad_address_is_rejected() {
        let config = HttpConfig {
            bind_address: "not-an-address".into(),
            ..HttpConfig::default()
        };
        assert!(config.socket_addr().is_err());
    }
}
