//! Logical backup as plain SQL text.
//!
//! The output is dialect-agnostic: unquoted table names, positional
//! `INSERT INTO <table> VALUES (...)` statements, and literals either dialect
//! accepts.

use crate::error::{DbError, DbResult};
use crate::models::{BackendId, QueryRows};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

pub fn render_header(created_at: DateTime<Utc>, backend: BackendId) -> String {
    format!(
        "-- backup\n-- created: {}\n-- backend: {}\n\n",
        created_at.to_rfc3339(),
        backend
    )
}

/// SQL literal for a decoded column value.
pub fn sql_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => quote_string(s),
        // JSON columns are stored back as their text form
        other => quote_string(&other.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// One `INSERT` line per row, values in column order.
pub fn render_inserts(table: &str, rows: &QueryRows) -> String {
    let mut out = String::new();
    for row in &rows.rows {
        let values: Vec<_> = rows.ordered_values(row).map(sql_literal).collect();
        out.push_str(&format!(
            "INSERT INTO {} VALUES ({});\n",
            table,
            values.join(", ")
        ));
    }
    out
}

/// Buffered file sink for a backup in progress.
pub struct BackupSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl BackupSink {
    /// Create (or truncate) the target file, creating parent directories.
    pub async fn create(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create directory for", parent, e))?;
        }
        let file = File::create(path)
            .await
            .map_err(|e| io_error("create", path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub async fn write_header(&mut self, created_at: DateTime<Utc>, backend: BackendId) -> DbResult<()> {
        self.write(&render_header(created_at, backend)).await
    }

    /// Write a table section. Returns the number of rows written.
    pub async fn write_table(&mut self, table: &str, rows: &QueryRows) -> DbResult<u64> {
        let mut section = format!("-- table: {}\n", table);
        section.push_str(&render_inserts(table, rows));
        section.push('\n');
        self.write(&section).await?;
        Ok(rows.len() as u64)
    }

    pub async fn finish(mut self) -> DbResult<()> {
        self.writer
            .flush()
            .await
            .map_err(|e| io_error("flush", &self.path, e))?;
        self.writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| io_error("sync", &self.path, e))
    }

    async fn write(&mut self, text: &str) -> DbResult<()> {
        self.writer
            .write_all(text.as_bytes())
            .await
            .map_err(|e| io_error("write", &self.path, e))
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> DbError {
    DbError::backup(format!("Failed to {} '{}': {}", action, path.display(), err))
}
