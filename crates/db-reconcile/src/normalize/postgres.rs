//! Postgres type spelling.

use super::RawColumn;

/// Compose a type from `udt_name` plus precision/length.
///
/// Arrays (`_int4`) become `int4[]`; numerics carry `(precision,scale)` and
/// character types carry `(length)` when the column declares them.
pub(super) fn column_type(column: &RawColumn) -> String {
    let udt = column
        .udt_name
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(&column.data_type);

    if column.data_type.eq_ignore_ascii_case("ARRAY") || udt.starts_with('_') {
        return format!("{}[]", udt.trim_start_matches('_'));
    }

    match udt {
        "numeric" | "decimal" => match column.numeric_precision {
            Some(p) => format!("{}({},{})", udt, p, column.numeric_scale.unwrap_or(0)),
            None => udt.to_string(),
        },
        "varchar" | "bpchar" | "char" => match column.character_maximum_length {
            Some(len) => format!("{}({})", udt, len),
            None => udt.to_string(),
        },
        other => other.to_string(),
    }
}

/// `nextval('orders_id_seq'::regclass)`: a serial column's sequence.
pub(super) fn is_serial_default(default: &str) -> bool {
    default.trim_start().to_ascii_lowercase().starts_with("nextval(")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(data_type: &str, udt: &str) -> RawColumn {
        RawColumn {
            data_type: data_type.into(),
            udt_name: Some(udt.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_numeric_precision_scale() {
        let mut c = raw("numeric", "numeric");
        c.numeric_precision = Some(10);
        c.numeric_scale = Some(2);
        assert_eq!(column_type(&c), "numeric(10,2)");
        assert_eq!(column_type(&raw("numeric", "numeric")), "numeric");
    }

    #[test]
    fn test_character_length() {
        let mut c = raw("character varying", "varchar");
        c.character_maximum_length = Some(255);
        assert_eq!(column_type(&c), "varchar(255)");
        let mut c = raw("character", "bpchar");
        c.character_maximum_length = Some(3);
        assert_eq!(column_type(&c), "bpchar(3)");
    }

    #[test]
    fn test_integers_ignore_precision() {
        let mut c = raw("integer", "int4");
        c.numeric_precision = Some(32);
        assert_eq!(column_type(&c), "int4");
    }

    #[test]
    fn test_serial_default_detection() {
        assert!(is_serial_default("nextval('orders_id_seq'::regclass)"));
        assert!(is_serial_default("NEXTVAL('s')"));
        assert!(!is_serial_default("0"));
        assert!(!is_serial_default("'nextval(x)'::text"));
    }

    #[test]
    fn test_arrays() {
        assert_eq!(column_type(&raw("ARRAY", "_text")), "text[]");
        assert_eq!(column_type(&raw("ARRAY", "_int4")), "int4[]");
    }
}
