use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, SqlitePool, TypeInfo, ValueRef};

use super::{Row, Scalar, Store};
use crate::{se, Result, LOG};

/// A local sqlite database, migrated on connect
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        slog::info!(LOG, "connected sqlite store"; "url" => url);
        Ok(Self { pool })
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut map = serde_json::Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            serde_json::Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => serde_json::Value::from(row.try_get::<i64, _>(i)?),
                "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(i)?)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                "TEXT" => serde_json::Value::from(row.try_get::<String, _>(i)?),
                other => {
                    return Err(se!(
                        "unsupported sqlite type {} in column {}",
                        other,
                        column.name()
                    ))
                }
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(Row(map))
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn execute(&self, sql: &str, params: &[Scalar]) -> Result<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Scalar::Null => query.bind(None::<i64>),
                Scalar::Int(v) => query.bind(*v),
                Scalar::Real(v) => query.bind(*v),
                Scalar::Text(v) => query.bind(v.as_str()),
            };
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}
