/*!
The one query primitive everything else is built on

`Store::execute` runs a single parameterized statement and hands back
rows as column-name keyed json maps. A local sqlite database and a hosted
sql endpoint both sit behind it.
*/
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::StoreTarget;
use crate::{se, Result};

mod hosted;
mod sqlite;

pub use hosted::HostedStore;
pub use sqlite::SqliteStore;

#[cfg(test)]
pub(crate) use sqlite::tests::temp_store;

/// Schema statements, as applied to local stores by migration
pub const SCHEMA: &str = include_str!("../../migrations/20240101000000_listening.sql");

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Real(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// Build a `Vec<Scalar>` from mixed values
#[macro_export]
macro_rules! params {
    () => { Vec::<$crate::store::Scalar>::new() };
    ($($v:expr),+ $(,)?) => {
        vec![$($crate::store::Scalar::from($v)),+]
    };
}

/// One result row
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Row(pub serde_json::Map<String, serde_json::Value>);

impl Row {
    pub fn get(&self, col: &str) -> Option<&serde_json::Value> {
        self.0.get(col)
    }

    /// Integer column that may be null. Whole-valued floats are accepted
    /// since some endpoints hand back aggregates as floats.
    pub fn opt_int(&self, col: &str) -> Result<Option<i64>> {
        match self.0.get(col) {
            None => Err(se!("missing column {}", col)),
            Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| se!("column {}: not an integer {}", col, n)),
            Some(v) => Err(se!("column {}: not an integer {:?}", col, v)),
        }
    }

    pub fn int(&self, col: &str) -> Result<i64> {
        self.opt_int(col)?
            .ok_or_else(|| se!("column {}: unexpected null", col))
    }

    pub fn opt_text(&self, col: &str) -> Result<Option<String>> {
        match self.0.get(col) {
            None => Err(se!("missing column {}", col)),
            Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
            Some(v) => Err(se!("column {}: not text {:?}", col, v)),
        }
    }

    /// Deserialize the row into a struct whose fields are column names
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(serde_json::Value::Object(self.0))?)
    }
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Run one statement with positional `?` parameters
    async fn execute(&self, sql: &str, params: &[Scalar]) -> Result<Vec<Row>>;
}

/// Run a statement expected to produce at most one row
pub async fn fetch_optional(store: &dyn Store, sql: &str, params: &[Scalar]) -> Result<Option<Row>> {
    Ok(store.execute(sql, params).await?.into_iter().next())
}

/// Run a statement that must produce a row
pub async fn fetch_one(store: &dyn Store, sql: &str, params: &[Scalar]) -> Result<Row> {
    fetch_optional(store, sql, params)
        .await?
        .ok_or_else(|| se!("expected a row from: {}", sql.trim()))
}

/// Run a statement and decode every row
pub async fn fetch_all<T: DeserializeOwned>(
    store: &dyn Store,
    sql: &str,
    params: &[Scalar],
) -> Result<Vec<T>> {
    store
        .execute(sql, params)
        .await?
        .into_iter()
        .map(Row::decode)
        .collect()
}

pub async fn connect(target: &StoreTarget) -> Result<Arc<dyn Store>> {
    Ok(match target {
        StoreTarget::Sqlite(url) => Arc::new(SqliteStore::connect(url).await?),
        StoreTarget::Hosted { url, token } => Arc::new(HostedStore::new(url, token)),
    })
}
