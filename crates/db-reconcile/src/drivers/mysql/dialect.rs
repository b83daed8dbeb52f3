//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.

use crate::core::schema::{ColumnInfo, EngineKind};
use crate::core::traits::{ColumnChanges, Dialect};
use crate::core::value::Row;

/// MySQL/MariaDB dialect implementation.
#[derive(Debug, Clone)]
pub struct MysqlDialect {
    engine: EngineKind,
}

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self {
            engine: EngineKind::Mysql,
        }
    }

    /// Dialect for a MariaDB server.
    pub fn mariadb() -> Self {
        Self {
            engine: EngineKind::Mariadb,
        }
    }
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        self.engine.as_str()
    }

    fn engine(&self) -> EngineKind {
        self.engine
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        pk_columns: &[String],
        rows: &[Row],
    ) -> String {
        let non_pk_cols: Vec<_> = columns
            .iter()
            .filter(|c| !pk_columns.contains(c))
            .collect();

        // Only PK columns: nothing to update, skip duplicates
        if non_pk_cols.is_empty() {
            return format!(
                "INSERT IGNORE INTO {} ({}) VALUES {}",
                table,
                self.column_list(columns),
                self.values_list(rows)
            );
        }

        let update_set = non_pk_cols
            .iter()
            .map(|c| format!("{} = VALUES({})", self.quote_ident(c), self.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{} ON DUPLICATE KEY UPDATE {}",
            self.build_insert(table, columns, rows),
            update_set
        )
    }

    fn identity_clause(&self) -> Option<&'static str> {
        Some("AUTO_INCREMENT")
    }

    /// MODIFY COLUMN restates the whole definition, so one statement covers
    /// type, nullability and default together.
    fn alter_column(&self, table: &str, column: &ColumnInfo, changes: ColumnChanges) -> Vec<String> {
        if !changes.any() {
            return Vec::new();
        }
        vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            table,
            self.column_definition(column)
        )]
    }

    fn supports_alter_column(&self) -> bool {
        true
    }

    fn supports_constraint_ddl(&self) -> bool {
        true
    }

    fn drop_index(&self, table: &str, _schema: &str, index: &str) -> String {
        format!("DROP INDEX {} ON {}", self.quote_ident(index), table)
    }

    fn drop_foreign_key(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            table,
            self.quote_ident(name)
        )
    }

    /// MySQL implements unique constraints as indexes.
    fn drop_unique(&self, table: &str, name: &str) -> String {
        format!("ALTER TABLE {} DROP INDEX {}", table, self.quote_ident(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlValue;

    #[test]
    fn test_quote_ident() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.quote_ident("name"), "`name`");
        assert_eq!(dialect.quote_ident("table`name"), "`table``name`");
    }

    #[test]
    fn test_mariadb_name() {
        assert_eq!(MysqlDialect::mariadb().name(), "mariadb");
        assert_eq!(MysqlDialect::new().name(), "mysql");
    }

    #[test]
    fn test_build_upsert() {
        let dialect = MysqlDialect::new();
        let sql = dialect.build_upsert(
            "`shop`.`users`",
            &["id".to_string(), "name".to_string()],
            &["id".to_string()],
            &[vec![SqlValue::I64(1), SqlValue::from("a")]],
        );
        assert_eq!(
            sql,
            "INSERT INTO `shop`.`users` (`id`, `name`) VALUES (1, 'a') \
             ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
        );
    }

    #[test]
    fn test_build_upsert_pk_only() {
        let dialect = MysqlDialect::new();
        let sql = dialect.build_upsert(
            "`shop`.`tags`",
            &["id".to_string()],
            &["id".to_string()],
            &[vec![SqlValue::I64(1)]],
        );
        assert!(sql.starts_with("INSERT IGNORE INTO `shop`.`tags`"));
    }

    #[test]
    fn test_alter_column_is_single_modify() {
        let dialect = MysqlDialect::new();
        let column = ColumnInfo {
            name: "email".into(),
            data_type: "varchar(320)".into(),
            nullable: false,
            default_value: Some("''".into()),
            is_primary_key: false,
            is_unique: false,
            is_identity: false,
            comment: None,
        };
        let stmts = dialect.alter_column(
            "`shop`.`users`",
            &column,
            ColumnChanges {
                data_type: true,
                nullable: true,
                default_value: false,
            },
        );
        assert_eq!(
            stmts,
            vec!["ALTER TABLE `shop`.`users` MODIFY COLUMN `email` varchar(320) NOT NULL DEFAULT ''"]
        );
    }

    #[test]
    fn test_drop_statements() {
        let dialect = MysqlDialect::new();
        assert_eq!(
            dialect.drop_index("`shop`.`users`", "shop", "idx_name"),
            "DROP INDEX `idx_name` ON `shop`.`users`"
        );
        assert_eq!(
            dialect.drop_foreign_key("`shop`.`orders`", "fk_user"),
            "ALTER TABLE `shop`.`orders` DROP FOREIGN KEY `fk_user`"
        );
    }

    #[test]
    fn test_modify_keeps_auto_increment() {
        let dialect = MysqlDialect::new();
        let column = ColumnInfo {
            name: "id".into(),
            data_type: "bigint".into(),
            nullable: false,
            default_value: None,
            is_primary_key: true,
            is_unique: false,
            is_identity: true,
            comment: None,
        };
        let stmts = dialect.alter_column(
            "`shop`.`users`",
            &column,
            ColumnChanges {
                data_type: true,
                ..Default::default()
            },
        );
        assert_eq!(
            stmts,
            vec!["ALTER TABLE `shop`.`users` MODIFY COLUMN `id` bigint NOT NULL AUTO_INCREMENT"]
        );
    }
}
