//! Row identity maps and insert/update/delete classification.

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::value::Row;
use crate::error::{ReconcileError, Result};

use super::key::{digest_row, RowDigest, RowKey};
use super::options::RetryPolicy;
use super::source::RowSource;

/// Key → digest for every row of one side.
pub type DigestMap = BTreeMap<RowKey, RowDigest>;

/// Column layout shared by both sides of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowShape {
    /// Columns present on both sides, in source order.
    pub columns: Vec<String>,
    pub primary_keys: Vec<String>,
    key_positions: Vec<usize>,
    value_positions: Vec<usize>,
}

impl RowShape {
    /// Intersect both column lists and check the key.
    ///
    /// Fails with `InvalidPrimaryKey` when `primary_keys` is empty or a key
    /// column is missing on either side.
    pub fn new(
        source_columns: &[String],
        target_columns: &[String],
        primary_keys: &[String],
    ) -> Result<Self> {
        if primary_keys.is_empty() {
            return Err(ReconcileError::InvalidPrimaryKey(
                "at least one primary key column is required".to_string(),
            ));
        }
        for pk in primary_keys {
            if !source_columns.contains(pk) {
                return Err(ReconcileError::InvalidPrimaryKey(format!(
                    "column {} not found in source",
                    pk
                )));
            }
            if !target_columns.contains(pk) {
                return Err(ReconcileError::InvalidPrimaryKey(format!(
                    "column {} not found in target",
                    pk
                )));
            }
        }

        let columns: Vec<String> = source_columns
            .iter()
            .filter(|c| target_columns.contains(c))
            .cloned()
            .collect();
        let key_positions = primary_keys
            .iter()
            .filter_map(|pk| columns.iter().position(|c| c == pk))
            .collect();
        let value_positions = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !primary_keys.contains(c))
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            columns,
            primary_keys: primary_keys.to_vec(),
            key_positions,
            value_positions,
        })
    }

    /// Key and digest of a row laid out as [`RowShape::columns`].
    pub fn digest(&self, row: &Row) -> (RowKey, RowDigest) {
        digest_row(row, &self.key_positions, &self.value_positions)
    }
}

/// Stream one side page by page into a digest map. Each page read is
/// retried on transient errors per `retry`.
pub async fn read_digests<S: RowSource + ?Sized>(
    side: &S,
    shape: &RowShape,
    page_size: usize,
    retry: &RetryPolicy,
) -> Result<DigestMap> {
    let mut map = DigestMap::new();
    let mut offset = 0;
    let what = format!("Scan of {}", side.table_ref());
    let (columns, order_by) = (&shape.columns, &shape.primary_keys);
    loop {
        let page = retry
            .run(&what, move || side.scan_page(columns, order_by, offset, page_size))
            .await?;
        let fetched = page.len();
        for row in &page {
            let (key, digest) = shape.digest(row);
            map.insert(key, digest);
        }
        offset += fetched;
        if fetched < page_size {
            break;
        }
    }
    debug!("{}: {} rows keyed", side.table_ref(), map.len());
    Ok(map)
}

/// Keys split into mutually exclusive buckets. Each entry holds the row's
/// key values.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Only in the source.
    pub missing_in_target: Vec<Row>,
    /// Only in the target.
    pub missing_in_source: Vec<Row>,
    /// On both sides with differing content.
    pub different: Vec<Row>,
    /// On both sides with equal content.
    pub unchanged: usize,
}

/// Compare two digest maps.
pub fn classify(source: &DigestMap, target: &DigestMap) -> Classification {
    let mut out = Classification::default();
    for (key, s) in source {
        match target.get(key) {
            None => out.missing_in_target.push(s.key_values.clone()),
            Some(t) if t.digest != s.digest => out.different.push(s.key_values.clone()),
            Some(_) => out.unchanged += 1,
        }
    }
    for (key, t) in target {
        if !source.contains_key(key) {
            out.missing_in_source.push(t.key_values.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlValue;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn map(shape: &RowShape, rows: &[Row]) -> DigestMap {
        rows.iter().map(|r| shape.digest(r)).collect()
    }

    #[test]
    fn test_shape_requires_key() {
        let err = RowShape::new(&cols(&["id"]), &cols(&["id"]), &[]).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidPrimaryKey(_)));

        let err = RowShape::new(&cols(&["id", "name"]), &cols(&["name"]), &cols(&["id"])).unwrap_err();
        assert!(err.to_string().contains("not found in target"));
    }

    #[test]
    fn test_shape_intersects_columns() {
        let shape = RowShape::new(
            &cols(&["id", "name", "only_src"]),
            &cols(&["only_tgt", "name", "id"]),
            &cols(&["id"]),
        )
        .unwrap();
        assert_eq!(shape.columns, cols(&["id", "name"]));
    }

    #[test]
    fn test_users_scenario() {
        let shape = RowShape::new(&cols(&["id", "name"]), &cols(&["id", "name"]), &cols(&["id"])).unwrap();
        let source = map(
            &shape,
            &[
                vec![SqlValue::I64(1), SqlValue::from("a")],
                vec![SqlValue::I64(2), SqlValue::from("b")],
            ],
        );
        let target = map(
            &shape,
            &[
                vec![SqlValue::I64(1), SqlValue::from("a")],
                vec![SqlValue::I64(3), SqlValue::from("c")],
            ],
        );

        let c = classify(&source, &target);
        assert_eq!(c.missing_in_target, vec![vec![SqlValue::I64(2)]]);
        assert_eq!(c.missing_in_source, vec![vec![SqlValue::I64(3)]]);
        assert!(c.different.is_empty());
        assert_eq!(c.unchanged, 1);
    }

    #[test]
    fn test_buckets_are_disjoint() {
        let shape = RowShape::new(&cols(&["a", "b", "v"]), &cols(&["a", "b", "v"]), &cols(&["a", "b"])).unwrap();
        let rows = |vals: &[(i64, &str, &str)]| -> Vec<Row> {
            vals.iter()
                .map(|(a, b, v)| vec![SqlValue::I64(*a), SqlValue::from(*b), SqlValue::from(*v)])
                .collect()
        };
        let source = map(&shape, &rows(&[(1, "x", "p"), (1, "y", "q"), (2, "x", "r"), (3, "z", "s")]));
        let target = map(&shape, &rows(&[(1, "x", "p"), (1, "y", "changed"), (4, "x", "t")]));

        let c = classify(&source, &target);
        let mut seen = std::collections::HashSet::new();
        for key in c.missing_in_target.iter().chain(&c.missing_in_source).chain(&c.different) {
            assert!(seen.insert(RowKey::from_values(key)), "key in two buckets");
        }
        assert_eq!(c.missing_in_target.len(), 2);
        assert_eq!(c.missing_in_source.len(), 1);
        assert_eq!(c.different.len(), 1);
        assert_eq!(c.unchanged, 1);
    }

    #[test]
    fn test_cross_engine_values_compare_equal() {
        let shape = RowShape::new(&cols(&["id", "flag"]), &cols(&["id", "flag"]), &cols(&["id"])).unwrap();
        let source = map(&shape, &[vec![SqlValue::I64(1), SqlValue::Bool(true)]]);
        let target = map(&shape, &[vec![SqlValue::from("1"), SqlValue::I64(1)]]);
        let c = classify(&source, &target);
        assert_eq!(c.unchanged, 1);
    }
}
