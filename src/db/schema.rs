//! DDL rendering for both dialects.
//!
//! Everything here is pure: a `TableSpec` goes in, SQL text comes out. The
//! manager runs the result on whichever engine it actually holds.
//!
//! # Architecture
//!
//! Introspection SQL lives in the `queries` submodule with one constant set per
//! dialect. Type mapping and identifier quoting are the only places the two
//! dialects diverge when creating objects.

use crate::error::{DbError, DbResult};
use crate::models::{ColumnDefault, ColumnSpec, Constraint, Dialect, IndexSpec, LogicalType, TableSpec};

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod mysql {
        pub const TABLE_EXISTS: &str = r#"
            SELECT COUNT(*) AS table_count
            FROM information_schema.tables
            WHERE table_schema = DATABASE() AND table_name = ?
            "#;

        pub const TABLE_INFO: &str = r#"
            SELECT
                column_name AS name,
                column_type AS type,
                is_nullable,
                column_default,
                column_key
            FROM information_schema.columns
            WHERE table_schema = DATABASE() AND table_name = ?
            ORDER BY ordinal_position
            "#;

        pub const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";
    }

    pub mod sqlite {
        pub const TABLE_EXISTS: &str = r#"
            SELECT COUNT(*) AS table_count
            FROM sqlite_master
            WHERE type = 'table' AND name = ?
            "#;

        pub const TABLE_INFO: &str = r#"
            SELECT name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?)
            ORDER BY cid
            "#;
    }
}

/// Query counting tables named by its single parameter. One row, one column.
pub fn table_exists_query(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Server => queries::mysql::TABLE_EXISTS,
        Dialect::Embedded => queries::sqlite::TABLE_EXISTS,
    }
}

/// Column metadata for the table named by the single parameter.
pub fn table_info_query(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Server => queries::mysql::TABLE_INFO,
        Dialect::Embedded => queries::sqlite::TABLE_INFO,
    }
}

/// Quote an identifier, doubling any embedded quote character.
pub fn quote_ident(name: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Server => format!("`{}`", name.replace('`', "``")),
        Dialect::Embedded => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

pub fn count_rows_query(table: &str, dialect: Dialect) -> String {
    format!("SELECT COUNT(*) AS row_count FROM {}", quote_ident(table, dialect))
}

pub fn select_all_query(table: &str, dialect: Dialect) -> String {
    format!("SELECT * FROM {}", quote_ident(table, dialect))
}

/// Maintenance statements for `optimize`, in execution order.
pub fn maintenance_statements<'a>(
    tables: impl IntoIterator<Item = &'a str>,
    dialect: Dialect,
) -> Vec<String> {
    match dialect {
        Dialect::Server => tables
            .into_iter()
            .flat_map(|t| {
                let quoted = quote_ident(t, dialect);
                [
                    format!("ANALYZE TABLE {}", quoted),
                    format!("OPTIMIZE TABLE {}", quoted),
                ]
            })
            .collect(),
        Dialect::Embedded => vec!["ANALYZE".to_string(), "PRAGMA optimize".to_string()],
    }
}

/// Render the column type, including identity and timestamp defaults that
/// are part of the type in one dialect or the other.
pub fn render_type(column: &ColumnSpec, table: &str, dialect: Dialect) -> DbResult<String> {
    let rendered = match (&column.logical_type, dialect) {
        (LogicalType::IdentityInt, Dialect::Server) => "INT AUTO_INCREMENT PRIMARY KEY".to_string(),
        (LogicalType::IdentityInt, Dialect::Embedded) => {
            "INTEGER PRIMARY KEY AUTOINCREMENT".to_string()
        }
        (LogicalType::Integer, Dialect::Server) => "INT".to_string(),
        (LogicalType::Integer, Dialect::Embedded) => "INTEGER".to_string(),
        (LogicalType::BigInteger, Dialect::Server) => "BIGINT".to_string(),
        (LogicalType::BigInteger, Dialect::Embedded) => "INTEGER".to_string(),
        (LogicalType::Text(n), Dialect::Server) => format!("VARCHAR({})", n),
        (LogicalType::Text(_), Dialect::Embedded) => "TEXT".to_string(),
        (LogicalType::LongText, Dialect::Server) => "LONGTEXT".to_string(),
        (LogicalType::LongText, Dialect::Embedded) => "TEXT".to_string(),
        (LogicalType::Boolean, Dialect::Server) => "TINYINT(1)".to_string(),
        (LogicalType::Boolean, Dialect::Embedded) => "BOOLEAN".to_string(),
        (LogicalType::Decimal(p, s), Dialect::Server) => format!("DECIMAL({},{})", p, s),
        (LogicalType::Decimal(..), Dialect::Embedded) => "REAL".to_string(),
        (LogicalType::Date, Dialect::Server) => "DATE".to_string(),
        (LogicalType::Date, Dialect::Embedded) => "TEXT".to_string(),
        (LogicalType::Timestamp, Dialect::Server) => "DATETIME".to_string(),
        (LogicalType::Timestamp, Dialect::Embedded) => "TEXT".to_string(),
        (LogicalType::TimestampNowDefault, Dialect::Server) => {
            "DATETIME DEFAULT CURRENT_TIMESTAMP".to_string()
        }
        (LogicalType::TimestampNowDefault, Dialect::Embedded) => {
            "TEXT DEFAULT CURRENT_TIMESTAMP".to_string()
        }
        (LogicalType::Other(name), _) => {
            return Err(DbError::configuration(format!(
                "Column {}.{} has unmapped type '{}' for the {} dialect",
                table,
                column.name,
                name,
                dialect.display_name()
            )));
        }
    };
    Ok(rendered)
}

fn render_default(default: &ColumnDefault) -> String {
    match default {
        ColumnDefault::Int(i) => i.to_string(),
        ColumnDefault::Text(s) => format!("'{}'", s.replace('\'', "''")),
        ColumnDefault::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
    }
}

fn render_column(column: &ColumnSpec, table: &str, dialect: Dialect) -> DbResult<String> {
    if column.name.trim().is_empty() {
        return Err(DbError::configuration(format!(
            "Table {} has a column with an empty name",
            table
        )));
    }
    let mut sql = format!(
        "{} {}",
        quote_ident(&column.name, dialect),
        render_type(column, table, dialect)?
    );
    if column.logical_type.is_identity() {
        return Ok(sql);
    }
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if column.logical_type != LogicalType::TimestampNowDefault {
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&render_default(default));
        }
    }
    for constraint in &column.constraints {
        match constraint {
            Constraint::PrimaryKey => sql.push_str(" PRIMARY KEY"),
            Constraint::Unique => sql.push_str(" UNIQUE"),
            Constraint::References { .. } => {}
        }
    }
    Ok(sql)
}

fn column_list(columns: &[String], dialect: Dialect) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c, dialect))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render `CREATE TABLE IF NOT EXISTS` for one table.
///
/// Foreign keys and composite unique keys become table-level constraints.
pub fn render_table(table: &TableSpec, dialect: Dialect) -> DbResult<String> {
    if table.name.trim().is_empty() {
        return Err(DbError::configuration("Table name cannot be empty"));
    }
    if table.columns.is_empty() {
        return Err(DbError::configuration(format!(
            "Table {} has no columns",
            table.name
        )));
    }

    let mut lines = table
        .columns
        .iter()
        .map(|c| render_column(c, &table.name, dialect))
        .collect::<DbResult<Vec<_>>>()?;

    for group in &table.unique_together {
        lines.push(format!("UNIQUE ({})", column_list(group, dialect)));
    }

    for column in &table.columns {
        for constraint in &column.constraints {
            if let Constraint::References {
                table: target,
                column: target_column,
                on_delete_cascade,
            } = constraint
            {
                let mut fk = format!(
                    "FOREIGN KEY ({}) REFERENCES {}({})",
                    quote_ident(&column.name, dialect),
                    quote_ident(target, dialect),
                    quote_ident(target_column, dialect)
                );
                if *on_delete_cascade {
                    fk.push_str(" ON DELETE CASCADE");
                }
                lines.push(fk);
            }
        }
    }

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(&table.name, dialect),
        lines.join(",\n    ")
    );
    if dialect == Dialect::Server {
        sql.push(' ');
        sql.push_str(queries::mysql::TABLE_OPTIONS);
    }
    Ok(sql)
}

/// Render `CREATE INDEX` for one index of `table`.
///
/// MySQL has no `IF NOT EXISTS` for indexes, so re-running the server form
/// fails with a duplicate-key error the caller treats as a warning.
pub fn render_index(table: &str, index: &IndexSpec, dialect: Dialect) -> DbResult<String> {
    if index.columns.is_empty() {
        return Err(DbError::configuration(format!(
            "Index {} on {} has no columns",
            index.name, table
        )));
    }
    let unique = if index.unique { "UNIQUE " } else { "" };
    let guard = match dialect {
        Dialect::Server => "",
        Dialect::Embedded => "IF NOT EXISTS ",
    };
    Ok(format!(
        "CREATE {}INDEX {}{} ON {} ({})",
        unique,
        guard,
        quote_ident(&index.name, dialect),
        quote_ident(table, dialect),
        column_list(&index.columns, dialect)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSpec {
        TableSpec::new("Users")
            .column(ColumnSpec::new("UserID", LogicalType::IdentityInt))
            .column(
                ColumnSpec::new("Username", LogicalType::Text(50))
                    .not_null()
                    .unique(),
            )
            .column(
                ColumnSpec::new("Role", LogicalType::Text(20))
                    .default_value(ColumnDefault::Text("User".into())),
            )
            .column(
                ColumnSpec::new("Active", LogicalType::Boolean)
                    .default_value(ColumnDefault::Bool(true)),
            )
            .column(ColumnSpec::new("CreatedDate", LogicalType::TimestampNowDefault))
    }

    #[test]
    fn test_render_server_table() {
        let sql = render_table(&users(), Dialect::Server).unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `Users` ("));
        assert!(sql.contains("`UserID` INT AUTO_INCREMENT PRIMARY KEY"));
        assert!(sql.contains("`Username` VARCHAR(50) NOT NULL UNIQUE"));
        assert!(sql.contains("`Role` VARCHAR(20) DEFAULT 'User'"));
        assert!(sql.contains("`Active` TINYINT(1) DEFAULT 1"));
        assert!(sql.contains("`CreatedDate` DATETIME DEFAULT CURRENT_TIMESTAMP"));
        assert!(sql.ends_with("ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"));
    }

    #[test]
    fn test_render_embedded_table() {
        let sql = render_table(&users(), Dialect::Embedded).unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"Users\" ("));
        assert!(sql.contains("\"UserID\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"Username\" TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("\"Active\" BOOLEAN DEFAULT 1"));
        assert!(sql.contains("\"CreatedDate\" TEXT DEFAULT CURRENT_TIMESTAMP"));
        assert!(!sql.contains("ENGINE"));
    }

    #[test]
    fn test_rendering_is_dialect_distinct_for_every_type() {
        let types = [
            LogicalType::IdentityInt,
            LogicalType::Integer,
            LogicalType::BigInteger,
            LogicalType::Text(10),
            LogicalType::LongText,
            LogicalType::Boolean,
            LogicalType::Decimal(15, 2),
            LogicalType::Date,
            LogicalType::Timestamp,
            LogicalType::TimestampNowDefault,
        ];
        for ty in types {
            let column = ColumnSpec::new("c", ty.clone());
            let server = render_type(&column, "t", Dialect::Server).unwrap();
            let embedded = render_type(&column, "t", Dialect::Embedded).unwrap();
            assert_ne!(server, embedded, "{} renders identically", ty);
        }
    }

    #[test]
    fn test_unmapped_type_is_configuration_error() {
        let table = TableSpec::new("Files")
            .column(ColumnSpec::new("Blob", "varbinary(max)".parse().unwrap()));
        for dialect in [Dialect::Server, Dialect::Embedded] {
            let err = render_table(&table, dialect).unwrap_err();
            assert!(matches!(err, DbError::Configuration { .. }));
            assert!(err.to_string().contains("Files.Blob"));
        }
    }

    #[test]
    fn test_foreign_keys_and_composite_unique() {
        let table = TableSpec::new("ProjectMembers")
            .column(ColumnSpec::new("MemberID", LogicalType::IdentityInt))
            .column(
                ColumnSpec::new("ProjectID", LogicalType::Integer)
                    .not_null()
                    .references_cascade("Projects", "ProjectID"),
            )
            .column(
                ColumnSpec::new("UserID", LogicalType::Integer)
                    .not_null()
                    .references("Users", "UserID"),
            )
            .unique_together(&["ProjectID", "UserID"]);
        let sql = render_table(&table, Dialect::Embedded).unwrap();
        assert!(sql.contains("UNIQUE (\"ProjectID\", \"UserID\")"));
        assert!(sql.contains(
            "FOREIGN KEY (\"ProjectID\") REFERENCES \"Projects\"(\"ProjectID\") ON DELETE CASCADE"
        ));
        assert!(sql.contains("FOREIGN KEY (\"UserID\") REFERENCES \"Users\"(\"UserID\")"));
        assert!(!sql.contains("\"UserID\") ON DELETE"));
    }

    #[test]
    fn test_render_index() {
        let index = IndexSpec::new("IX_Tasks_Status", &["Status"]);
        assert_eq!(
            render_index("Tasks", &index, Dialect::Server).unwrap(),
            "CREATE INDEX `IX_Tasks_Status` ON `Tasks` (`Status`)"
        );
        assert_eq!(
            render_index("Tasks", &index, Dialect::Embedded).unwrap(),
            "CREATE INDEX IF NOT EXISTS \"IX_Tasks_Status\" ON \"Tasks\" (\"Status\")"
        );
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("a`b", Dialect::Server), "`a``b`");
        assert_eq!(quote_ident("a\"b", Dialect::Embedded), "\"a\"\"b\"");
    }

    #[test]
    fn test_text_default_escapes_quotes() {
        let column = ColumnSpec::new("Status", LogicalType::Text(20))
            .default_value(ColumnDefault::Text("To Do's".into()));
        let sql = render_column(&column, "Tasks", Dialect::Server).unwrap();
        assert!(sql.ends_with("DEFAULT 'To Do''s'"));
    }

    #[test]
    fn test_introspection_queries_per_dialect() {
        assert!(table_exists_query(Dialect::Server).contains("information_schema.tables"));
        assert!(table_exists_query(Dialect::Embedded).contains("sqlite_master"));
        assert!(table_info_query(Dialect::Embedded).contains("pragma_table_info"));
    }

    #[test]
    fn test_maintenance_statements() {
        let server = maintenance_statements(["Users", "Tasks"], Dialect::Server);
        assert_eq!(server.len(), 4);
        assert_eq!(server[0], "ANALYZE TABLE `Users`");
        assert_eq!(server[3], "OPTIMIZE TABLE `Tasks`");
        let embedded = maintenance_statements(["Users"], Dialect::Embedded);
        assert_eq!(embedded, vec!["ANALYZE", "PRAGMA optimize"]);
    }
}
