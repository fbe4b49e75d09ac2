//! Legacy (EIP-155) transaction building and signing.

use std::fmt;

use k256::ecdsa::SigningKey;

use crate::abi::keccak256;
use crate::error::{LedgerError, LedgerResult};
use crate::rlp::{self, Item};

/// A 20-byte account address.
pub type Address = [u8; 20];

/// Parse a `0x`-prefixed hex address.
///
/// # Errors
///
/// Returns [`LedgerError::Config`] if the string is not 20 hex bytes.
pub fn parse_address(value: &str) -> LedgerResult<Address> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(digits)
        .map_err(|e| LedgerError::Config(format!("invalid address {value}: {e}")))?;
    Address::try_from(bytes.as_slice())
        .map_err(|_| LedgerError::Config(format!("address {value} is not 20 bytes")))
}

/// Lowercase `0x` hex.
#[must_use]
pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// An unsigned legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    /// Sender nonce.
    pub nonce: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// Contract address.
    pub to: Address,
    /// Value in wei.
    pub value: u128,
    /// Calldata.
    pub data: Vec<u8>,
    /// Chain id for replay protection.
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn base_fields(&self) -> Vec<Item> {
        vec![
            Item::uint(u128::from(self.nonce)),
            Item::uint(self.gas_price),
            Item::uint(u128::from(self.gas_limit)),
            Item::Bytes(self.to.to_vec()),
            Item::uint(self.value),
            Item::Bytes(self.data.clone()),
        ]
    }

    /// Hash that gets signed: keccak of the RLP list with
    /// `chain_id, 0, 0` appended.
    #[must_use]
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut fields = self.base_fields();
        fields.push(Item::uint(u128::from(self.chain_id)));
        fields.push(Item::uint(0));
        fields.push(Item::uint(0));
        keccak256(&rlp::encode(&Item::List(fields)))
    }
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// RLP-encoded bytes.
    pub raw: Vec<u8>,
    /// Keccak of `raw`.
    pub hash: [u8; 32],
}

impl SignedTransaction {
    /// `0x`-prefixed hash.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        to_hex_prefixed(&self.hash)
    }

    /// `0x`-prefixed raw bytes.
    #[must_use]
    pub fn raw_hex(&self) -> String {
        to_hex_prefixed(&self.raw)
    }
}

/// Holds the ledger account key.
pub struct TransactionSigner {
    key: SigningKey,
    address: Address,
}

impl TransactionSigner {
    /// Load a secp256k1 private key from hex (with or without `0x`).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if the key is malformed or out of
    /// range.
    pub fn from_hex(private_key: &str) -> LedgerResult<Self> {
        let digits = private_key.trim().strip_prefix("0x").unwrap_or(private_key.trim());
        let bytes = hex::decode(digits)
            .map_err(|_| LedgerError::Config("ledger private key is not valid hex".into()))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| LedgerError::Config("ledger private key is not a valid secp256k1 scalar".into()))?;
        let address = address_of(&key);
        Ok(Self { key, address })
    }

    /// Address derived from the key.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// `0x`-prefixed address.
    #[must_use]
    pub fn address_hex(&self) -> String {
        to_hex_prefixed(&self.address)
    }

    /// Sign `tx` with EIP-155 replay protection.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if signing fails or `v` overflows.
    pub fn sign(&self, tx: &LegacyTransaction) -> LedgerResult<SignedTransaction> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&tx.signing_hash())
            .map_err(|e| LedgerError::Config(format!("signing failed: {e}")))?;

        let v = tx
            .chain_id
            .checked_mul(2)
            .and_then(|x| x.checked_add(35))
            .and_then(|x| x.checked_add(u64::from(recovery_id.to_byte())))
            .ok_or_else(|| LedgerError::Config(format!("chain id {} too large", tx.chain_id)))?;

        let sig_bytes = signature.to_bytes();
        let (r, s) = sig_bytes.split_at(32);

        let mut fields = tx.base_fields();
        fields.push(Item::uint(u128::from(v)));
        fields.push(Item::scalar(r));
        fields.push(Item::scalar(s));

        let raw = rlp::encode(&Item::List(fields));
        let hash = keccak256(&raw);
        Ok(SignedTransaction { raw, hash })
    }
}

impl fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("address", &self.address_hex())
            .finish_non_exhaustive()
    }
}

fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}
