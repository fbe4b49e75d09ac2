//! JSON-RPC transport to an EVM node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Hosts allowed over plain HTTP.
const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// Reject RPC URLs that would send signed transactions in cleartext.
///
/// `https` is always accepted. `http` is accepted for loopback hosts, or for
/// any host when `allow_insecure` is set.
///
/// # Errors
///
/// Returns [`LedgerError::InsecureUrl`] for plaintext remote URLs and
/// [`LedgerError::Config`] for unparseable ones.
pub fn validate_rpc_url(url: &str, allow_insecure: bool) -> LedgerResult<Url> {
    let parsed =
        Url::parse(url).map_err(|e| LedgerError::Config(format!("invalid RPC URL {url}: {e}")))?;

    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" => {
            let host = parsed.host_str().unwrap_or_default();
            if LOOPBACK_HOSTS.contains(&host) {
                Ok(parsed)
            } else if allow_insecure {
                warn!(url = %url, "Using plaintext HTTP RPC endpoint; transactions are visible on the wire");
                Ok(parsed)
            } else {
                Err(LedgerError::InsecureUrl(format!(
                    "{url} uses http; use https or enable allow_insecure_rpc"
                )))
            }
        },
        other => Err(LedgerError::InsecureUrl(format!(
            "unsupported RPC scheme '{other}' in {url}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// A transaction receipt, reduced to the fields the ledger reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Transaction hash.
    pub transaction_hash: String,
    /// `0x1` on success, `0x0` on revert.
    #[serde(default)]
    pub status: Option<String>,
    /// Emitted logs.
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Whether the transaction succeeded. Pre-Byzantium receipts without a
    /// status count as success.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status
            .as_deref()
            .is_none_or(|s| parse_quantity(s).is_ok_and(|v| v == 1))
    }
}

/// A receipt log entry.
#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    /// Emitting contract.
    pub address: String,
    /// Indexed topics, `0x` hex.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Non-indexed data, `0x` hex.
    #[serde(default)]
    pub data: String,
}

/// Parse a `0x` hex quantity.
///
/// # Errors
///
/// Returns [`LedgerError::Decode`] if the string is not a hex quantity that
/// fits in a `u128`.
pub fn parse_quantity(value: &str) -> LedgerResult<u128> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::Decode(format!("quantity {value} lacks 0x prefix")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Decode(format!("bad quantity {value}: {e}")))
}

/// Parse a `0x` hex quantity that must fit in a `u64`.
///
/// # Errors
///
/// Returns [`LedgerError::Decode`] if parsing fails or the value is too
/// large.
pub fn parse_quantity_u64(value: &str) -> LedgerResult<u64> {
    let wide = parse_quantity(value)?;
    u64::try_from(wide).map_err(|_| LedgerError::Decode(format!("quantity {value} exceeds u64")))
}

/// Decode `0x` hex data.
///
/// # Errors
///
/// Returns [`LedgerError::Decode`] on invalid hex.
pub fn decode_data(value: &str) -> LedgerResult<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| LedgerError::Decode(format!("bad hex data: {e}")))
}

/// Format a quantity for a request parameter.
#[must_use]
pub fn quantity(value: u128) -> String {
    format!("{value:#x}")
}

/// JSON-RPC 2.0 client.
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for an already-validated URL.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if the HTTP client cannot be built.
    pub fn new(url: Url) -> LedgerResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if LOOPBACK_HOSTS.contains(&url.host_str().unwrap_or_default()) {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| LedgerError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Call `method` and deserialize its result. A `null` result
    /// deserializes into `T` as JSON `null`, so use `Option<T>` where the
    /// node may have nothing to return.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] on transport failure,
    /// [`LedgerError::Rpc`] when the node returns an error object, and
    /// [`LedgerError::Decode`] when the result has the wrong shape.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "JSON-RPC request");

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("invalid JSON-RPC response: {e}")))?;

        if let Some(error) = envelope.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(envelope.result.unwrap_or(Value::Null))
            .map_err(|e| LedgerError::Decode(format!("{method} result: {e}")))
    }
}
