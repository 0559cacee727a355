//! # JSON-RPC Ledger Adapter
//!
//! Talks to a standard ledger RPC node: HTTP for reads, WebSocket
//! `logsSubscribe` for the live feed.

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use jsonrpsee::core::client::{ClientT, Error as ClientError, SubscriptionClientT};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::WsClientBuilder;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{
    Address, LedgerTransaction, RawInstruction, SignatureInfo, SignatureNotice, TxSignature,
};
use tracing::{debug, warn};

use crate::domain::{LedgerError, RpcEndpointConfig};
use crate::ports::{LedgerReader, SignatureFeed};

/// JSON-RPC method-not-found code.
const METHOD_NOT_FOUND: i32 = -32601;

/// Ledger reader backed by a JSON-RPC node.
pub struct JsonRpcLedger {
    client: HttpClient,
    config: RpcEndpointConfig,
}

impl JsonRpcLedger {
    /// Build the HTTP client. No request is made until first use.
    pub fn new(config: RpcEndpointConfig) -> Result<Self, LedgerError> {
        let client = HttpClientBuilder::default()
            .request_timeout(config.request_timeout)
            .build(&config.rpc_url)
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Endpoint configuration in use.
    pub fn config(&self) -> &RpcEndpointConfig {
        &self.config
    }

    fn map_error(&self, err: ClientError) -> LedgerError {
        match err {
            ClientError::RequestTimeout => LedgerError::Timeout(self.config.request_timeout),
            ClientError::ParseError(e) => LedgerError::MalformedResponse(e.to_string()),
            other => LedgerError::Unavailable(other.to_string()),
        }
    }
}

#[async_trait]
impl LedgerReader for JsonRpcLedger {
    async fn get_transaction(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        let options = json!({
            "encoding": "json",
            "commitment": self.config.commitment,
            "maxSupportedTransactionVersion": 0,
        });
        let response: Option<RpcTransaction> = self
            .client
            .request("getTransaction", rpc_params![signature.as_str(), options])
            .await
            .map_err(|e| self.map_error(e))?;

        response
            .map(|tx| tx.into_ledger_transaction(signature.clone()))
            .transpose()
    }

    async fn get_account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, LedgerError> {
        let options = json!({
            "encoding": "base64",
            "commitment": self.config.commitment,
        });
        let response: RpcContextual<Option<RpcAccount>> = self
            .client
            .request(
                "getAccountInfo",
                rpc_params![address.to_string(), options],
            )
            .await
            .map_err(|e| self.map_error(e))?;

        let Some(account) = response.value else {
            return Ok(None);
        };
        let (encoded, encoding) = account.data;
        if encoding != "base64" {
            return Err(LedgerError::MalformedResponse(format!(
                "unexpected account encoding {encoding}"
            )));
        }
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map(Some)
            .map_err(|e| LedgerError::MalformedResponse(e.to_string()))
    }

    async fn list_recent_signatures(
        &self,
        program: &Address,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, LedgerError> {
        let options = json!({
            "limit": limit,
            "commitment": self.config.commitment,
        });
        let response: Vec<RpcSignatureEntry> = self
            .client
            .request(
                "getSignaturesForAddress",
                rpc_params![program.to_string(), options],
            )
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(response
            .into_iter()
            .map(|entry| SignatureInfo {
                signature: TxSignature::new(entry.signature),
                slot: entry.slot,
                failed: !entry.err.is_null(),
            })
            .collect())
    }

    async fn subscribe(&self, program: &Address) -> Result<SignatureFeed, LedgerError> {
        let Some(ws_url) = self.config.ws_url.as_deref() else {
            return Err(LedgerError::SubscriptionUnsupported(
                "no websocket endpoint configured".to_string(),
            ));
        };

        let client = WsClientBuilder::default()
            .request_timeout(self.config.request_timeout)
            .build(ws_url)
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        let filter = json!({ "mentions": [program.to_string()] });
        let options = json!({ "commitment": self.config.commitment });
        let subscription = client
            .subscribe::<RpcLogsNotification, _>(
                "logsSubscribe",
                rpc_params![filter, options],
                "logsUnsubscribe",
            )
            .await
            .map_err(|e| match e {
                ClientError::Call(ref obj) if obj.code() == METHOD_NOT_FOUND => {
                    LedgerError::SubscriptionUnsupported(obj.message().to_string())
                }
                other => self.map_error(other),
            })?;

        debug!("[sp-01] logs subscription open for {}", program);

        // The client must outlive the subscription; both travel in the state.
        let feed = futures::stream::unfold(
            (client, subscription),
            |(client, mut subscription)| async move {
                loop {
                    match subscription.next().await {
                        Some(Ok(notice)) => {
                            return Some((notice.into_notice(), (client, subscription)));
                        }
                        Some(Err(e)) => {
                            warn!("[sp-01] undecodable logs notification: {}", e);
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(feed.boxed())
    }
}

// =============================================================================
// WIRE SHAPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct RpcContextual<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    data: (String, String),
}

#[derive(Debug, Deserialize)]
struct RpcSignatureEntry {
    signature: String,
    slot: u64,
    #[serde(default)]
    err: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    slot: u64,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    meta: Option<RpcMeta>,
    transaction: RpcTransactionBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMeta {
    #[serde(default)]
    err: Value,
    #[serde(default)]
    loaded_addresses: Option<RpcLoadedAddresses>,
}

#[derive(Debug, Default, Deserialize)]
struct RpcLoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcTransactionBody {
    message: RpcMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMessage {
    account_keys: Vec<String>,
    instructions: Vec<RpcInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcInstruction {
    program_id_index: usize,
    accounts: Vec<usize>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct RpcLogsNotification {
    context: RpcSlotContext,
    value: RpcLogsValue,
}

#[derive(Debug, Deserialize)]
struct RpcSlotContext {
    slot: u64,
}

#[derive(Debug, Deserialize)]
struct RpcLogsValue {
    signature: String,
}

impl RpcLogsNotification {
    fn into_notice(self) -> SignatureNotice {
        SignatureNotice {
            signature: TxSignature::new(self.value.signature),
            slot: self.context.slot,
        }
    }
}

impl RpcTransaction {
    fn into_ledger_transaction(
        self,
        signature: TxSignature,
    ) -> Result<LedgerTransaction, LedgerError> {
        let failed = self
            .meta
            .as_ref()
            .map(|meta| !meta.err.is_null())
            .unwrap_or(false);

        // Static keys first, then lookup-table keys: writable before readonly.
        let loaded = self
            .meta
            .and_then(|meta| meta.loaded_addresses)
            .unwrap_or_default();
        let keys = self
            .transaction
            .message
            .account_keys
            .iter()
            .chain(loaded.writable.iter())
            .chain(loaded.readonly.iter())
            .map(|key| parse_address(key))
            .collect::<Result<Vec<_>, _>>()?;

        let lookup = |index: usize| {
            keys.get(index).copied().ok_or_else(|| {
                LedgerError::MalformedResponse(format!("account index {index} out of range"))
            })
        };

        let instructions = self
            .transaction
            .message
            .instructions
            .into_iter()
            .map(|ix| {
                let data = bs58::decode(&ix.data)
                    .into_vec()
                    .map_err(|e| LedgerError::MalformedResponse(e.to_string()))?;
                let accounts = ix
                    .accounts
                    .iter()
                    .map(|&i| lookup(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RawInstruction {
                    program_id: lookup(ix.program_id_index)?,
                    data,
                    accounts,
                })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;

        Ok(LedgerTransaction {
            signature,
            slot: self.slot,
            block_time: self.block_time,
            failed,
            instructions,
        })
    }
}

fn parse_address(key: &str) -> Result<Address, LedgerError> {
    key.parse()
        .map_err(|e| LedgerError::MalformedResponse(format!("bad account key {key}: {e}")))
}
