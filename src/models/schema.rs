//! Dialect-neutral schema definitions.
//!
//! A `TableSpec` describes a table once; the renderer in `db::schema` turns it
//! into DDL for either dialect.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;

/// Column type independent of any SQL dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalType {
    /// Auto-incrementing integer primary key.
    IdentityInt,
    Integer,
    BigInteger,
    /// Bounded text with a maximum length.
    Text(u32),
    LongText,
    Boolean,
    /// Fixed-point number with precision and scale.
    Decimal(u8, u8),
    Date,
    Timestamp,
    /// Timestamp defaulting to the insertion time.
    TimestampNowDefault,
    /// A type name no renderer knows. Rendering it is a configuration error.
    Other(String),
}

impl LogicalType {
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::IdentityInt)
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdentityInt => f.write_str("identity_int"),
            Self::Integer => f.write_str("integer"),
            Self::BigInteger => f.write_str("big_integer"),
            Self::Text(n) => write!(f, "text({})", n),
            Self::LongText => f.write_str("long_text"),
            Self::Boolean => f.write_str("boolean"),
            Self::Decimal(p, s) => write!(f, "decimal({},{})", p, s),
            Self::Date => f.write_str("date"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::TimestampNowDefault => f.write_str("timestamp_now_default"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

impl FromStr for LogicalType {
    type Err = Infallible;

    /// Unknown names parse into `Other` so a bad catalog fails at render time
    /// with the offending column named.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(' ', "");
        let parsed = match normalized.as_str() {
            "identity_int" => Self::IdentityInt,
            "integer" | "int" => Self::Integer,
            "big_integer" | "bigint" => Self::BigInteger,
            "long_text" => Self::LongText,
            "boolean" | "bool" => Self::Boolean,
            "date" => Self::Date,
            "timestamp" => Self::Timestamp,
            "timestamp_now_default" | "timestamp_now" => Self::TimestampNowDefault,
            other => parse_sized(other).unwrap_or_else(|| Self::Other(s.trim().to_string())),
        };
        Ok(parsed)
    }
}

fn parse_sized(s: &str) -> Option<LogicalType> {
    let (name, args) = s.strip_suffix(')')?.split_once('(')?;
    match name {
        "text" => args.parse().ok().filter(|n| *n > 0).map(LogicalType::Text),
        "decimal" => {
            let (p, s) = args.split_once(',')?;
            let (p, s): (u8, u8) = (p.parse().ok()?, s.parse().ok()?);
            (p > 0 && s <= p).then_some(LogicalType::Decimal(p, s))
        }
        _ => None,
    }
}

impl From<String> for LogicalType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

impl From<LogicalType> for String {
    fn from(t: LogicalType) -> Self {
        t.to_string()
    }
}

/// Literal default value of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefault {
    Int(i64),
    Text(String),
    Bool(bool),
    CurrentTimestamp,
}

/// Column-level constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    PrimaryKey,
    Unique,
    References {
        table: String,
        column: String,
        #[serde(default)]
        on_delete_cascade: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub logical_type: LogicalType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefault>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
            default: None,
            constraints: Vec::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn unique(mut self) -> Self {
        self.constraints.push(Constraint::Unique);
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.constraints.push(Constraint::References {
            table: table.to_string(),
            column: column.to_string(),
            on_delete_cascade: false,
        });
        self
    }

    pub fn references_cascade(mut self, table: &str, column: &str) -> Self {
        self.constraints.push(Constraint::References {
            table: table.to_string(),
            column: column.to_string(),
            on_delete_cascade: true,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    /// Multi-column unique constraints.
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            unique_together: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn unique_together(mut self, columns: &[&str]) -> Self {
        self.unique_together
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Ordered list of tables; creation order respects foreign keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub tables: Vec<TableSpec>,
    /// Table whose presence means the schema was already provisioned.
    pub marker_table: String,
}

impl SchemaDefinition {
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }
}

/// Outcome of `DatabaseManager::ensure_schema`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaReport {
    /// The marker table existed; only missing tables were created and
    /// nothing was seeded.
    pub already_provisioned: bool,
    pub created_tables: Vec<String>,
    /// Tables whose DDL failed; provisioning continued past them.
    pub failed_tables: Vec<String>,
    /// Non-fatal problems (index failures, seed failures).
    pub warnings: Vec<String>,
    /// Baseline rows inserted during this run.
    pub seeded_rows: u64,
}

impl SchemaReport {
    pub fn is_complete(&self) -> bool {
        self.failed_tables.is_empty()
    }
}
