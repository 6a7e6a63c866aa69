pub mod filter;
pub mod repository;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

pub use filter::{Condition, Filter, FilterError, Order, OrderBy, Where};
pub use repository::{
    CourseStore, CreateRepository, Entity, EnrollmentStore, MutableEntity, ReadRepository,
    SqliteRepository, WriteRepository,
};

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Single-connection in-memory database. Every connection to `sqlite::memory:`
/// opens a fresh database, so the pool must never hold more than one.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
}

pub async fn migrate(db: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(db).await
}

/// A column value on its way into a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Text(value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

pub(crate) fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: SqlValue) {
    match value {
        SqlValue::Null => qb.push_bind(None::<String>),
        SqlValue::Text(s) => qb.push_bind(s),
        SqlValue::Integer(i) => qb.push_bind(i),
        SqlValue::Real(f) => qb.push_bind(f),
        SqlValue::Bool(b) => qb.push_bind(b),
    };
}
