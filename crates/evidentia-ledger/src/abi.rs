//! Solidity ABI encoding for the evidence contract.
//!
//! Only the types the contract uses are supported: `uint256`, `string` and
//! `string[]`. Integers are limited to `u128`, which covers indices and
//! fixed-point confidence.

use sha3::{Digest, Keccak256};

use crate::anchor::LedgerRecord;
use crate::error::{LedgerError, LedgerResult};
use evidentia_core::ConfidenceScaled;

const WORD: usize = 32;

/// Signature of the write entrypoint.
pub const STORE_EVIDENCE: &str =
    "storeEvidence(string,string,string,string,string,string,string[],string,uint256,string)";

/// Signature of the read-by-index entrypoint.
pub const GET_EVIDENCE: &str = "getEvidence(uint256)";

/// Signature of the count entrypoint.
pub const GET_EVIDENCE_COUNT: &str = "getEvidenceCount()";

/// Signature of the event emitted by a successful write.
pub const EVIDENCE_STORED_EVENT: &str = "EvidenceStored(uint256,string)";

/// Layout of the tuple `getEvidence` returns.
const RECORD_LAYOUT: [Kind; 10] = [
    Kind::String,      // contentHash
    Kind::String,      // postId
    Kind::String,      // timestamp
    Kind::String,      // investigator
    Kind::String,      // content
    Kind::String,      // authorHandle
    Kind::StringArray, // mediaUrls
    Kind::String,      // classification
    Kind::Uint,        // confidenceScaled
    Kind::String,      // engagementMetrics
];

/// Keccak-256.
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// First four bytes of the keccak of a function signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic 0 of an event.
#[must_use]
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// An ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `uint256` (values above `u128::MAX` are not supported).
    Uint(u128),
    /// `string`.
    String(String),
    /// `string[]`.
    StringArray(Vec<String>),
}

/// An ABI type, used to drive decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `uint256`.
    Uint,
    /// `string`.
    String,
    /// `string[]`.
    StringArray,
}

impl Token {
    fn is_dynamic(&self) -> bool {
        !matches!(self, Self::Uint(_))
    }
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn usize_word(value: usize) -> [u8; WORD] {
    uint_word(value as u128)
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD).saturating_mul(WORD)
}

fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&usize_word(bytes.len()));
    out.extend_from_slice(bytes);
    let padding = padded_len(bytes.len()).saturating_sub(bytes.len());
    out.resize(out.len().saturating_add(padding), 0);
}

fn encode_string_array(items: &[String]) -> Vec<u8> {
    let tokens: Vec<Token> = items.iter().cloned().map(Token::String).collect();
    let mut out = usize_word(items.len()).to_vec();
    out.extend(encode(&tokens));
    out
}

fn encode_tail(token: &Token) -> Vec<u8> {
    match token {
        Token::Uint(v) => uint_word(*v).to_vec(),
        Token::String(s) => {
            let mut out = Vec::new();
            encode_bytes(&mut out, s.as_bytes());
            out
        },
        Token::StringArray(items) => encode_string_array(items),
    }
}

/// Encode a tuple of tokens (head/tail layout).
#[must_use]
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len().saturating_mul(WORD);
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(head_len.saturating_add(tail.len())));
            tail.extend(encode_tail(token));
        } else {
            head.extend(encode_tail(token));
        }
    }

    head.extend(tail);
    head
}

/// Selector followed by the encoded arguments.
#[must_use]
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(args));
    data
}

/// The record as the contract's ten-field tuple, in argument order.
#[must_use]
pub fn record_tokens(record: &LedgerRecord) -> Vec<Token> {
    vec![
        Token::String(record.content_hash.clone()),
        Token::String(record.post_id.clone()),
        Token::String(record.timestamp.clone()),
        Token::String(record.investigator.clone()),
        Token::String(record.content.clone()),
        Token::String(record.author_handle.clone()),
        Token::StringArray(record.media_urls.clone()),
        Token::String(record.classification.clone()),
        Token::Uint(u128::from(record.confidence.raw())),
        Token::String(record.engagement_metrics.clone()),
    ]
}

/// Calldata for `storeEvidence`.
#[must_use]
pub fn encode_store_evidence(record: &LedgerRecord) -> Vec<u8> {
    encode_call(STORE_EVIDENCE, &record_tokens(record))
}

/// Calldata for `getEvidence(index)`.
#[must_use]
pub fn encode_get_evidence(index: u64) -> Vec<u8> {
    encode_call(GET_EVIDENCE, &[Token::Uint(u128::from(index))])
}

/// Calldata for `getEvidenceCount()`.
#[must_use]
pub fn encode_get_evidence_count() -> Vec<u8> {
    encode_call(GET_EVIDENCE_COUNT, &[])
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn add(a: usize, b: usize) -> LedgerResult<usize> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::Decode("offset overflow".into()))
}

fn word_at(data: &[u8], offset: usize) -> LedgerResult<&[u8]> {
    data.get(offset..add(offset, WORD)?)
        .ok_or_else(|| LedgerError::Decode(format!("truncated word at offset {offset}")))
}

fn read_u128(data: &[u8], offset: usize) -> LedgerResult<u128> {
    let word = word_at(data, offset)?;
    if word[..16].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode("uint256 value exceeds u128".into()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

fn read_usize(data: &[u8], offset: usize) -> LedgerResult<usize> {
    let value = read_u128(data, offset)?;
    usize::try_from(value).map_err(|_| LedgerError::Decode(format!("length {value} too large")))
}

fn read_string(data: &[u8], offset: usize) -> LedgerResult<String> {
    let len = read_usize(data, offset)?;
    let start = add(offset, WORD)?;
    let bytes = data
        .get(start..add(start, len)?)
        .ok_or_else(|| LedgerError::Decode("truncated string".into()))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| LedgerError::Decode(e.to_string()))
}

fn read_string_array(data: &[u8], offset: usize) -> LedgerResult<Vec<String>> {
    let count = read_usize(data, offset)?;
    let base = add(offset, WORD)?;
    let remaining = data.len().saturating_sub(base);
    if count > remaining / WORD {
        return Err(LedgerError::Decode(format!("array length {count} exceeds data")));
    }
    let mut items = Vec::with_capacity(count);
    for i in 0..count {
        let rel = read_usize(data, add(base, i.saturating_mul(WORD))?)?;
        items.push(read_string(data, add(base, rel)?)?);
    }
    Ok(items)
}

/// Decode a tuple with the given layout.
///
/// # Errors
///
/// Returns [`LedgerError::Decode`] on truncated or malformed data.
pub fn decode(kinds: &[Kind], data: &[u8]) -> LedgerResult<Vec<Token>> {
    let mut tokens = Vec::with_capacity(kinds.len());
    for (i, kind) in kinds.iter().enumerate() {
        let head = i.saturating_mul(WORD);
        let token = match kind {
            Kind::Uint => Token::Uint(read_u128(data, head)?),
            Kind::String => Token::String(read_string(data, read_usize(data, head)?)?),
            Kind::StringArray => {
                Token::StringArray(read_string_array(data, read_usize(data, head)?)?)
            },
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Decode a single `uint256` return value.
///
/// # Errors
///
/// Returns [`LedgerError::Decode`] if the value is missing or too large.
pub fn decode_uint(data: &[u8]) -> LedgerResult<u128> {
    read_u128(data, 0)
}

/// Decode the `getEvidence` return tuple.
///
/// # Errors
///
/// Returns [`LedgerError::Decode`] on malformed data.
pub fn decode_record(data: &[u8]) -> LedgerResult<LedgerRecord> {
    let mut tokens = decode(&RECORD_LAYOUT, data)?.into_iter();
    let mut string = || match tokens.next() {
        Some(Token::String(s)) => Ok(s),
        other => Err(LedgerError::Decode(format!("expected string, got {other:?}"))),
    };

    let content_hash = string()?;
    let post_id = string()?;
    let timestamp = string()?;
    let investigator = string()?;
    let content = string()?;
    let author_handle = string()?;
    drop(string);

    let Some(Token::StringArray(media_urls)) = tokens.next() else {
        return Err(LedgerError::Decode("expected string[] for media urls".into()));
    };
    let Some(Token::String(classification)) = tokens.next() else {
        return Err(LedgerError::Decode("expected string for classification".into()));
    };
    let Some(Token::Uint(confidence)) = tokens.next() else {
        return Err(LedgerError::Decode("expected uint for confidence".into()));
    };
    let Some(Token::String(engagement_metrics)) = tokens.next() else {
        return Err(LedgerError::Decode("expected string for engagement".into()));
    };

    let confidence = u64::try_from(confidence)
        .map_err(|_| LedgerError::Decode(format!("confidence {confidence} out of range")))?;

    Ok(LedgerRecord {
        content_hash,
        post_id,
        timestamp,
        investigator,
        content,
        author_handle,
        media_urls,
        classification,
        confidence: ConfidenceScaled::from_raw(confidence),
        engagement_metrics,
    })
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn sample_record() -> LedgerRecord {
        LedgerRecord {
            content_hash: "ab".repeat(32),
            post_id: "100".into(),
            timestamp: "2024-01-01T00:00:00".into(),
            investigator: "7".into(),
            content: "A post long enough to need more than one thirty-two byte word".into(),
            author_handle: "user1".into(),
            media_urls: vec!["https://img/1.png".into(), String::new()],
            classification: "threat".into(),
            confidence: ConfidenceScaled::from_raw(8765),
            engagement_metrics: "{}".into(),
        }
    }

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
        assert_eq!(
            hex::encode(event_topic("Transfer(address,address,uint256)")),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_encode_string_matches_solidity_layout() {
        let encoded = encode(&[Token::String("abc".into())]);
        let expected = format!(
            "{:064x}{:064x}{}{}",
            32,
            3,
            hex::encode("abc"),
            "0".repeat(64 - 6)
        );
        assert_eq!(hex::encode(encoded), expected);
    }

    #[test]
    fn test_encode_mixed_static_and_dynamic() {
        let encoded = encode(&[Token::Uint(5), Token::StringArray(vec![])]);
        // head: uint, offset(64); tail: length 0
        assert_eq!(encoded.len(), 3 * WORD);
        assert_eq!(read_u128(&encoded, 0).unwrap(), 5);
        assert_eq!(read_u128(&encoded, WORD).unwrap(), 64);
        assert_eq!(read_u128(&encoded, 2 * WORD).unwrap(), 0);
    }

    #[test]
    fn test_record_tuple_decodes_back() {
        let record = sample_record();
        let calldata = encode_store_evidence(&record);
        assert_eq!(&calldata[..4], &selector(STORE_EVIDENCE));

        let decoded = decode_record(&calldata[4..]).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let calldata = encode_store_evidence(&sample_record());
        let truncated = &calldata[4..calldata.len() - 40];
        assert!(matches!(decode_record(truncated), Err(LedgerError::Decode(_))));
        assert!(decode_uint(&[0u8; 8]).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_uint() {
        let mut word = [0u8; WORD];
        word[0] = 1;
        assert!(decode_uint(&word).is_err());
    }

    #[test]
    fn test_get_evidence_calldata() {
        let data = encode_get_evidence(3);
        assert_eq!(data.len(), 4 + WORD);
        assert_eq!(read_u128(&data[4..], 0).unwrap(), 3);
        assert_eq!(encode_get_evidence_count(), selector(GET_EVIDENCE_COUNT).to_vec());
    }
}
