//! Query-related data models.
//!
//! This module defines statement parameters, result shapes, and the
//! transaction step type used by the manager.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter. Used in performance samples
    /// so parameter values never reach the logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Parse a CLI argument into the narrowest matching parameter.
    ///
    /// `null`, `true`/`false`, integers and floats are recognised; anything
    /// else is passed through as a string.
    pub fn from_cli_arg(arg: &str) -> Self {
        match arg {
            "null" | "NULL" => return Self::Null,
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = arg.parse::<i64>() {
            return Self::Int(i);
        }
        match arg.parse::<f64>() {
            Ok(f) if f.is_finite() => Self::Float(f),
            _ => Self::String(arg.to_string()),
        }
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// One result row keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// Rows returned by a statement, with the column order preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row, if any.
    pub fn first_value(&self) -> Option<&JsonValue> {
        let column = self.columns.first()?;
        self.rows.first()?.get(column)
    }

    /// Values of one row in column order.
    pub fn ordered_values<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = &'a JsonValue> {
        self.columns
            .iter()
            .map(move |c| row.get(c).unwrap_or(&JsonValue::Null))
    }
}

/// Outcome of `DatabaseManager::execute`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecuteResult {
    /// The statement produced a result set.
    Rows(QueryRows),
    /// DDL or DML, committed.
    Affected { rows_affected: u64 },
}

impl ExecuteResult {
    pub fn rows(&self) -> Option<&QueryRows> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Affected { .. } => None,
        }
    }

    pub fn into_rows(self) -> Option<QueryRows> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Affected { .. } => None,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Affected { rows_affected } => Some(*rows_affected),
            Self::Rows(_) => None,
        }
    }
}

/// Result of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub rows_affected: u64,
    /// Identity generated by an INSERT, when the driver reports one.
    pub last_insert_id: Option<i64>,
}

/// One step of a multi-statement transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOp {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

impl TransactionOp {
    pub fn new(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Leading keywords of statements that return a result set.
const ROW_RETURNING_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "PRAGMA", "SHOW", "EXPLAIN", "VALUES", "DESCRIBE", "DESC",
];

/// Leading keywords of DML that may carry a `RETURNING` clause.
const DML_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "REPLACE"];

/// Check whether a statement produces rows.
///
/// Judged by its first keyword, or for DML by a top-level `RETURNING`
/// clause. Leading whitespace, `--` line comments and `/* */` block comments
/// are skipped.
pub fn returns_rows(sql: &str) -> bool {
    let keyword = leading_keyword(sql);
    let is_any = |list: &[&str]| list.iter().any(|k| k.eq_ignore_ascii_case(keyword));
    is_any(ROW_RETURNING_KEYWORDS) || (is_any(DML_KEYWORDS) && has_returning_clause(sql))
}

/// Scan for a `RETURNING` word outside literals, comments and parentheses.
fn has_returning_clause(sql: &str) -> bool {
    let mut chars = sql.chars().peekable();
    let mut depth = 0usize;
    let mut word = String::new();

    while let Some(c) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        if depth == 0 && word.eq_ignore_ascii_case("RETURNING") {
            return true;
        }
        word.clear();

        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '\'' | '"' | '`' => {
                // Doubled quotes inside a literal reopen it on the next pass
                for q in chars.by_ref() {
                    if q == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for q in chars.by_ref() {
                    if q == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for q in chars.by_ref() {
                    if prev == '*' && q == '/' {
                        break;
                    }
                    prev = q;
                }
            }
            _ => {}
        }
    }
    depth == 0 && word.eq_ignore_ascii_case("RETURNING")
}

fn leading_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_param_deserialization() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 42, 3.5, "hello"]"#).unwrap();
        assert!(params[0].is_null());
        assert_eq!(params[1], QueryParam::Bool(true));
        assert_eq!(params[2], QueryParam::Int(42));
        assert_eq!(params[3], QueryParam::Float(3.5));
        assert_eq!(params[4], QueryParam::String("hello".to_string()));
    }

    #[test]
    fn test_from_cli_arg() {
        assert_eq!(QueryParam::from_cli_arg("NULL"), QueryParam::Null);
        assert_eq!(QueryParam::from_cli_arg("false"), QueryParam::Bool(false));
        assert_eq!(QueryParam::from_cli_arg("-7"), QueryParam::Int(-7));
        assert_eq!(QueryParam::from_cli_arg("2.25"), QueryParam::Float(2.25));
        assert_eq!(
            QueryParam::from_cli_arg("Planning"),
            QueryParam::String("Planning".to_string())
        );
        assert_eq!(
            QueryParam::from_cli_arg("inf"),
            QueryParam::String("inf".to_string())
        );
    }

    #[test]
    fn test_option_into_param() {
        let none: Option<i64> = None;
        assert_eq!(QueryParam::from(none), QueryParam::Null);
        assert_eq!(QueryParam::from(Some("x")), QueryParam::String("x".into()));
    }

    #[test]
    fn test_returns_rows() {
        assert!(returns_rows("SELECT 1"));
        assert!(returns_rows("  select * from Users"));
        assert!(returns_rows("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(returns_rows("PRAGMA table_info(Users)"));
        assert!(returns_rows("-- comment\nSELECT 1"));
        assert!(returns_rows("/* hint */ SHOW TABLES"));
        assert!(!returns_rows("INSERT INTO Users (Username) VALUES ('a')"));
        assert!(!returns_rows("CREATE TABLE t (id INT)"));
        assert!(!returns_rows("UPDATE Tasks SET Status = 'Done'"));
        assert!(!returns_rows(""));
    }

    #[test]
    fn test_returning_clause_returns_rows() {
        assert!(returns_rows("INSERT INTO t (v) VALUES ('a') RETURNING id"));
        assert!(returns_rows("update Tasks set Status = 'Done' returning TaskID, Status"));
        assert!(returns_rows("DELETE FROM t WHERE id = ?\nRETURNING *"));
        assert!(!returns_rows("INSERT INTO t (v) VALUES ('RETURNING')"));
        assert!(!returns_rows("INSERT INTO t (v) VALUES ('it''s') -- RETURNING id"));
        assert!(!returns_rows("INSERT INTO t (v) SELECT returning_id FROM s"));
        assert!(!returns_rows("UPDATE t SET v = (SELECT 1 /* RETURNING */)"));
        assert!(!returns_rows("CREATE TABLE returning (id INT)"));
    }

    #[test]
    fn test_first_value_and_ordering() {
        let mut row = Row::new();
        row.insert("b".to_string(), json!(2));
        row.insert("a".to_string(), json!(1));
        let rows = QueryRows {
            columns: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            rows: vec![row],
        };
        assert_eq!(rows.first_value(), Some(&json!(1)));
        let values: Vec<_> = rows.ordered_values(&rows.rows[0]).cloned().collect();
        assert_eq!(values, vec![json!(1), json!(2), JsonValue::Null]);
    }

    #[test]
    fn test_first_value_empty() {
        assert_eq!(QueryRows::default().first_value(), None);
    }

    #[test]
    fn test_execute_result_accessors() {
        let affected = ExecuteResult::Affected { rows_affected: 3 };
        assert_eq!(affected.rows_affected(), Some(3));
        assert!(affected.rows().is_none());
    }
}
