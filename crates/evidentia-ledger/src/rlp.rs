//! Minimal RLP encoder for legacy transactions.

/// An RLP item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// A byte string.
    Bytes(Vec<u8>),
    /// A list of items.
    List(Vec<Item>),
}

impl Item {
    /// An unsigned integer as a minimal big-endian byte string.
    #[must_use]
    pub fn uint(value: u128) -> Self {
        Self::Bytes(trim_leading_zeros(&value.to_be_bytes()).to_vec())
    }

    /// A big-endian scalar with leading zeros stripped.
    #[must_use]
    pub fn scalar(bytes: &[u8]) -> Self {
        Self::Bytes(trim_leading_zeros(bytes).to_vec())
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn length_prefix(out: &mut Vec<u8>, len: usize, short_base: u8, long_base: u8) {
    if len < 56 {
        // len < 56 fits in a u8 and base + 55 never overflows.
        #[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]
        out.push(short_base + len as u8);
    } else {
        let len_bytes = trim_leading_zeros(&len.to_be_bytes()).to_vec();
        #[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]
        out.push(long_base + len_bytes.len() as u8);
        out.extend(len_bytes);
    }
}

/// Encode an item.
#[must_use]
pub fn encode(item: &Item) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(&mut out, item);
    out
}

fn encode_into(out: &mut Vec<u8>, item: &Item) {
    match item {
        Item::Bytes(bytes) => {
            if let [single] = bytes.as_slice() {
                if *single < 0x80 {
                    out.push(*single);
                    return;
                }
            }
            length_prefix(out, bytes.len(), 0x80, 0xb7);
            out.extend_from_slice(bytes);
        },
        Item::List(items) => {
            let mut payload = Vec::new();
            for item in items {
                encode_into(&mut payload, item);
            }
            length_prefix(out, payload.len(), 0xc0, 0xf7);
            out.extend(payload);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_encodings() {
        assert_eq!(encode(&Item::Bytes(b"dog".to_vec())), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(encode(&Item::uint(0)), vec![0x80]);
        assert_eq!(encode(&Item::uint(15)), vec![0x0f]);
        assert_eq!(encode(&Item::uint(1024)), vec![0x82, 0x04, 0x00]);
        assert_eq!(encode(&Item::List(vec![])), vec![0xc0]);
        assert_eq!(
            encode(&Item::List(vec![
                Item::Bytes(b"cat".to_vec()),
                Item::Bytes(b"dog".to_vec())
            ])),
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
    }

    #[test]
    fn test_long_string_prefix() {
        let text = b"Lorem ipsum dolor sit amet, consectetur adipisicing elit".to_vec();
        let encoded = encode(&Item::Bytes(text.clone()));
        assert_eq!(&encoded[..2], &[0xb8, 0x38]);
        assert_eq!(&encoded[2..], text.as_slice());
    }

    #[test]
    fn test_scalar_strips_leading_zeros() {
        assert_eq!(Item::scalar(&[0, 0, 1, 2]), Item::Bytes(vec![1, 2]));
        assert_eq!(Item::scalar(&[0, 0]), Item::Bytes(vec![]));
    }
}
