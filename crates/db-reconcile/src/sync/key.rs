//! Row identity and content digests.

use sha2::{Digest, Sha256};

use crate::core::value::{Row, SqlValue};

/// Structural primary-key tuple.
///
/// Each component is the canonical text of one key value, `None` for NULL.
/// Comparing tuples component-wise avoids delimiter collisions such as
/// `("a|b", "c")` versus `("a", "b|c")`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(pub Vec<Option<String>>);

impl RowKey {
    /// Build a key from values in primary-key order.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a SqlValue>) -> Self {
        Self(values.into_iter().map(SqlValue::canonical_text).collect())
    }

    /// Build a key by picking `positions` out of `row`.
    pub fn from_row(row: &Row, positions: &[usize]) -> Self {
        Self::from_values(positions.iter().map(|&i| &row[i]))
    }
}

/// SHA-256 over the canonical text of `values`.
///
/// Every value is framed with a presence byte and a length prefix, so NULL
/// differs from the empty string and adjacent values cannot run together.
pub fn content_digest<'a>(values: impl IntoIterator<Item = &'a SqlValue>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for value in values {
        match value.canonical_text() {
            None => hasher.update([0u8]),
            Some(text) => {
                hasher.update([1u8]);
                hasher.update((text.len() as u64).to_le_bytes());
                hasher.update(text.as_bytes());
            }
        }
    }
    hasher.finalize().into()
}

/// Key values and content digest of one row.
#[derive(Debug, Clone)]
pub struct RowDigest {
    /// Primary-key values as read, for fetch and delete statements.
    pub key_values: Row,
    pub digest: [u8; 32],
}

/// Split a row into its key and digest.
pub fn digest_row(row: &Row, key_positions: &[usize], value_positions: &[usize]) -> (RowKey, RowDigest) {
    let key = RowKey::from_row(row, key_positions);
    let digest = RowDigest {
        key_values: key_positions.iter().map(|&i| row[i].clone()).collect(),
        digest: content_digest(value_positions.iter().map(|&i| &row[i])),
    };
    (key, digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_has_no_delimiter_collisions() {
        let a = RowKey::from_values(&[SqlValue::from("a|b"), SqlValue::from("c")]);
        let b = RowKey::from_values(&[SqlValue::from("a"), SqlValue::from("b|c")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_is_engine_independent() {
        assert_eq!(
            RowKey::from_values(&[SqlValue::I64(1)]),
            RowKey::from_values(&[SqlValue::from("1")])
        );
    }

    #[test]
    fn test_digest_distinguishes_null_from_empty() {
        let null = content_digest(&[SqlValue::Null]);
        let empty = content_digest(&[SqlValue::from("")]);
        assert_ne!(null, empty);
    }

    #[test]
    fn test_digest_framing() {
        let a = content_digest(&[SqlValue::from("ab"), SqlValue::from("c")]);
        let b = content_digest(&[SqlValue::from("a"), SqlValue::from("bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_bool_matches_integer() {
        assert_eq!(
            content_digest(&[SqlValue::Bool(true)]),
            content_digest(&[SqlValue::I64(1)])
        );
    }

    #[test]
    fn test_digest_row() {
        let row = vec![SqlValue::I64(7), SqlValue::from("x"), SqlValue::Null];
        let (key, digest) = digest_row(&row, &[0], &[1, 2]);
        assert_eq!(key, RowKey(vec![Some("7".to_string())]));
        assert_eq!(digest.key_values, vec![SqlValue::I64(7)]);
        assert_eq!(
            digest.digest,
            content_digest(&[SqlValue::from("x"), SqlValue::Null])
        );
    }
}
