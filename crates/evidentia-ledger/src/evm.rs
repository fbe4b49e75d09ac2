//! [`LedgerAnchor`] over an EVM evidence contract.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use evidentia_core::LedgerPointer;
use serde_json::{Value, json};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::abi;
use crate::anchor::{
    AnchoredRecord, Confirmation, CostEstimate, DEFAULT_CONFIRMATION_TIMEOUT, LedgerAnchor,
    LedgerRecord, SubmissionHandle,
};
use crate::error::{LedgerError, LedgerResult};
use crate::rpc::{
    Receipt, RpcClient, decode_data, parse_quantity, parse_quantity_u64, quantity,
    validate_rpc_url,
};
use crate::tx::{Address, LegacyTransaction, TransactionSigner, parse_address, to_hex_prefixed};

/// Gas limit used when estimation fails.
pub const DEFAULT_FALLBACK_GAS_LIMIT: u64 = 2_000_000;

/// Gas price used when the node will not quote one (20 gwei).
pub const DEFAULT_FALLBACK_GAS_PRICE_WEI: u128 = 20_000_000_000;

/// Receipt polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Settings for [`EvmLedger`].
#[derive(Clone)]
pub struct EvmLedgerConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Evidence contract address.
    pub contract_address: String,
    /// Hex secp256k1 key of the submitting account.
    pub private_key: String,
    /// Chain id; queried from the node when `None`.
    pub chain_id: Option<u64>,
    /// Permit `http://` to non-loopback hosts.
    pub allow_insecure_rpc: bool,
    /// How long to wait for a receipt.
    pub confirmation_timeout: Duration,
    /// Delay between receipt polls.
    pub poll_interval: Duration,
    /// Gas limit when estimation fails.
    pub fallback_gas_limit: u64,
    /// Gas price when the node will not quote one.
    pub fallback_gas_price_wei: u128,
}

impl EvmLedgerConfig {
    /// Settings with default timing and fallback budget.
    #[must_use]
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_address: contract_address.into(),
            private_key: private_key.into(),
            chain_id: None,
            allow_insecure_rpc: false,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fallback_gas_limit: DEFAULT_FALLBACK_GAS_LIMIT,
            fallback_gas_price_wei: DEFAULT_FALLBACK_GAS_PRICE_WEI,
        }
    }
}

impl fmt::Debug for EvmLedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmLedgerConfig")
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("private_key", &"[REDACTED]")
            .field("chain_id", &self.chain_id)
            .field("allow_insecure_rpc", &self.allow_insecure_rpc)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Evidence ledger backed by a contract on an EVM chain.
#[derive(Debug)]
pub struct EvmLedger {
    rpc: RpcClient,
    contract: Address,
    signer: TransactionSigner,
    chain_id: OnceCell<u64>,
    /// Held from nonce lookup until the raw transaction is sent.
    nonce_lock: Mutex<()>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    fallback_gas_limit: u64,
    fallback_gas_price_wei: u128,
}

impl EvmLedger {
    /// Validate settings and build the client. No network traffic happens
    /// here.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsecureUrl`] or [`LedgerError::Config`] on
    /// bad settings.
    pub fn new(config: EvmLedgerConfig) -> LedgerResult<Self> {
        let url = validate_rpc_url(&config.rpc_url, config.allow_insecure_rpc)?;
        let contract = parse_address(&config.contract_address)?;
        let signer = TransactionSigner::from_hex(&config.private_key)?;

        info!(
            rpc_url = %url,
            contract = %to_hex_prefixed(&contract),
            account = %signer.address_hex(),
            "Ledger client configured"
        );

        Ok(Self {
            rpc: RpcClient::new(url)?,
            contract,
            signer,
            chain_id: OnceCell::new_with(config.chain_id),
            nonce_lock: Mutex::new(()),
            confirmation_timeout: config.confirmation_timeout,
            poll_interval: config.poll_interval,
            fallback_gas_limit: config.fallback_gas_limit,
            fallback_gas_price_wei: config.fallback_gas_price_wei,
        })
    }

    /// Submitting account address.
    #[must_use]
    pub fn account(&self) -> String {
        self.signer.address_hex()
    }

    fn contract_hex(&self) -> String {
        to_hex_prefixed(&self.contract)
    }

    async fn chain_id(&self) -> LedgerResult<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let id: String = self.rpc.call("eth_chainId", json!([])).await?;
                parse_quantity_u64(&id)
            })
            .await
            .copied()
    }

    async fn eth_call(&self, data: Vec<u8>) -> LedgerResult<Vec<u8>> {
        let call = json!({ "to": self.contract_hex(), "data": to_hex_prefixed(&data) });
        let result: String = self.rpc.call("eth_call", json!([call, "latest"])).await?;
        decode_data(&result)
    }

    async fn receipt(&self, tx_hash: &str) -> LedgerResult<Option<Receipt>> {
        self.rpc
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    /// Index carried by this contract's `EvidenceStored` event, if the
    /// receipt has one.
    fn evidence_index(&self, receipt: &Receipt) -> Option<u64> {
        let topic0 = to_hex_prefixed(&abi::event_topic(abi::EVIDENCE_STORED_EVENT));
        let contract = self.contract_hex();
        receipt
            .logs
            .iter()
            .filter(|log| log.address.eq_ignore_ascii_case(&contract))
            .find(|log| {
                log.topics
                    .first()
                    .is_some_and(|t| t.eq_ignore_ascii_case(&topic0))
            })
            .and_then(|log| log.topics.get(1))
            .and_then(|topic| parse_quantity_u64(topic).ok())
    }

    /// Resolve the index a successful receipt wrote. Falls back to
    /// `count - 1` when the event is missing, which is only correct if no
    /// other write landed in between.
    async fn confirmed_index(&self, receipt: &Receipt) -> LedgerResult<u64> {
        if let Some(index) = self.evidence_index(receipt) {
            return Ok(index);
        }
        warn!(
            tx_hash = %receipt.transaction_hash,
            "EvidenceStored event missing from receipt; using latest index"
        );
        let count = self.evidence_count().await?;
        count
            .checked_sub(1)
            .ok_or_else(|| LedgerError::Decode("ledger reports zero records after a write".into()))
    }

    async fn poll_receipt(&self, tx_hash: &str) -> LedgerResult<Confirmation> {
        loop {
            match self.receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.succeeded() => {
                    let index = self.confirmed_index(&receipt).await?;
                    return Ok(Confirmation::Confirmed(LedgerPointer {
                        index,
                        tx_hash: tx_hash.to_string(),
                    }));
                },
                Ok(Some(_)) => {
                    return Ok(Confirmation::Reverted {
                        tx_hash: tx_hash.to_string(),
                        reason: "execution reverted".into(),
                    });
                },
                Ok(None) => debug!(tx_hash, "Receipt not available yet"),
                Err(e) => warn!(tx_hash, error = %e, "Receipt poll failed; retrying"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerAnchor for EvmLedger {
    async fn estimate_cost(&self, record: &LedgerRecord) -> LedgerResult<CostEstimate> {
        let call = json!({
            "from": self.account(),
            "to": self.contract_hex(),
            "data": to_hex_prefixed(&abi::encode_store_evidence(record)),
        });

        let gas = match self.rpc.call::<String>("eth_estimateGas", json!([call])).await {
            Ok(raw) => parse_quantity_u64(&raw).ok(),
            Err(e) => {
                warn!(error = %e, "Gas estimation failed");
                None
            },
        };
        let price = match self.rpc.call::<String>("eth_gasPrice", json!([])).await {
            Ok(raw) => parse_quantity(&raw).ok(),
            Err(e) => {
                warn!(error = %e, "Gas price query failed");
                None
            },
        };

        Ok(CostEstimate {
            // 20% headroom over the node's estimate.
            gas_limit: gas.map_or(self.fallback_gas_limit, |g| g.saturating_add(g / 5)),
            gas_price_wei: price.unwrap_or(self.fallback_gas_price_wei),
            estimated: gas.is_some() && price.is_some(),
        })
    }

    async fn submit(
        &self,
        record: &LedgerRecord,
        cost: &CostEstimate,
    ) -> LedgerResult<SubmissionHandle> {
        let chain_id = self.chain_id().await?;
        let _guard = self.nonce_lock.lock().await;

        let nonce: String = self
            .rpc
            .call("eth_getTransactionCount", json!([self.account(), "pending"]))
            .await?;
        let tx = LegacyTransaction {
            nonce: parse_quantity_u64(&nonce)?,
            gas_price: cost.gas_price_wei,
            gas_limit: cost.gas_limit,
            to: self.contract,
            value: 0,
            data: abi::encode_store_evidence(record),
            chain_id,
        };
        let signed = self.signer.sign(&tx)?;
        let local_hash = signed.hash_hex();

        let tx_hash: String = match self
            .rpc
            .call("eth_sendRawTransaction", json!([signed.raw_hex()]))
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) if send_refused(&e) => {
                warn!(tx_hash = %local_hash, error = %e, "Node refused raw transaction");
                return Err(e);
            },
            Err(e) => {
                warn!(tx_hash = %local_hash, error = %e, "Raw transaction send failed; it may still land");
                return Err(LedgerError::SendUncertain {
                    tx_hash: local_hash,
                    reason: e.to_string(),
                });
            },
        };

        if !tx_hash.eq_ignore_ascii_case(&local_hash) {
            warn!(local = %local_hash, node = %tx_hash, "Node reported a different tx hash");
        }
        Ok(SubmissionHandle { tx_hash })
    }

    async fn await_confirmation(
        &self,
        handle: &SubmissionHandle,
        timeout: Duration,
    ) -> LedgerResult<Confirmation> {
        match tokio::time::timeout(timeout, self.poll_receipt(&handle.tx_hash)).await {
            Ok(result) => result,
            Err(_) => Ok(Confirmation::Timeout {
                tx_hash: handle.tx_hash.clone(),
            }),
        }
    }

    async fn fetch_by_index(&self, index: u64) -> LedgerResult<AnchoredRecord> {
        let data = match self.eth_call(abi::encode_get_evidence(index)).await {
            Ok(data) => data,
            Err(LedgerError::Rpc { message, .. }) => {
                debug!(index, message = %message, "getEvidence reverted");
                return Err(LedgerError::NotFound(format!("ledger index {index}")));
            },
            Err(e) => return Err(e),
        };
        if data.is_empty() {
            return Err(LedgerError::NotFound(format!("ledger index {index}")));
        }

        Ok(AnchoredRecord {
            index,
            tx_hash: None,
            record: abi::decode_record(&data)?,
        })
    }

    async fn fetch_by_tx_hash(&self, tx_hash: &str) -> LedgerResult<AnchoredRecord> {
        let receipt = self
            .receipt(tx_hash)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {tx_hash}")))?;
        if !receipt.succeeded() {
            return Err(LedgerError::NotFound(format!(
                "transaction {tx_hash} reverted and stored nothing"
            )));
        }
        let index = self.evidence_index(&receipt).ok_or_else(|| {
            LedgerError::Decode(format!("no EvidenceStored event in transaction {tx_hash}"))
        })?;

        let mut anchored = self.fetch_by_index(index).await?;
        anchored.tx_hash = Some(tx_hash.to_string());
        Ok(anchored)
    }

    async fn evidence_count(&self) -> LedgerResult<u64> {
        let data = self.eth_call(abi::encode_get_evidence_count()).await?;
        let count = abi::decode_uint(&data)?;
        u64::try_from(count).map_err(|_| LedgerError::Decode(format!("count {count} exceeds u64")))
    }

    fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }
}

/// Replies meaning the node already holds this transaction, or another
/// one with the same nonce that may be ours.
const KNOWN_TX_REPLIES: [&str; 4] = [
    "already known",
    "known transaction",
    "already imported",
    "nonce too low",
];

/// Whether a failed `eth_sendRawTransaction` proves the transaction was
/// not taken. Only an explicit node error counts, and not one that says
/// the node has seen it; a transport failure may hide an accepted send.
fn send_refused(err: &LedgerError) -> bool {
    match err {
        LedgerError::Rpc { message, .. } => {
            let message = message.to_ascii_lowercase();
            !KNOWN_TX_REPLIES.iter().any(|reply| message.contains(reply))
        },
        _ => false,
    }
}

/// Builds the JSON a node returns for `eth_getTransactionReceipt` on a
/// successful write. Shared with tests that stand in for a node.
#[doc(hidden)]
#[must_use]
pub fn stored_receipt_json(tx_hash: &str, contract: &str, index: u64) -> Value {
    let mut topic1 = [0u8; 32];
    topic1[24..].copy_from_slice(&index.to_be_bytes());
    json!({
        "transactionHash": tx_hash,
        "status": quantity(1),
        "logs": [{
            "address": contract,
            "topics": [
                to_hex_prefixed(&abi::event_topic(abi::EVIDENCE_STORED_EVENT)),
                to_hex_prefixed(&topic1),
            ],
            "data": "0x",
        }],
    })
}
