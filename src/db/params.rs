//! Parameter binding utilities for database queries.
//!
//! This module binds `QueryParam` values to dialect-specific query objects.
//! Used by single statements and transaction steps alike.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Sqlite};

pub(crate) type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;
pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(query: MySqlQuery<'q>, param: &'q QueryParam) -> MySqlQuery<'q> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: SqliteQuery<'q>,
    param: &'q QueryParam,
) -> SqliteQuery<'q> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Build a MySQL query with all parameters bound.
pub(crate) fn mysql_query<'q>(sql: &'q str, params: &'q [QueryParam]) -> MySqlQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| bind_mysql_param(query, param))
}

/// Build a SQLite query with all parameters bound.
pub(crate) fn sqlite_query<'q>(sql: &'q str, params: &'q [QueryParam]) -> SqliteQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| bind_sqlite_param(query, param))
}
