/*!
Error types shared by the ingestion, sync, and stats code
*/

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required environment configuration is absent
    #[error("missing required configuration: {}", .missing.join(", "))]
    Config { missing: Vec<String> },

    /// A required column role couldn't be found in a csv header
    #[error("could not detect required columns ({}), found headers: {}", .roles.join(", "), .headers.join(", "))]
    MissingColumn {
        roles: Vec<&'static str>,
        headers: Vec<String>,
    },

    /// The external scrobble source failed or returned an error payload
    #[error("scrobble source error: {0}")]
    Source(String),

    /// The query endpoint rejected or failed a statement
    #[error("store query failed: {0}")]
    Store(String),

    /// Another sync run currently holds the in_progress marker
    #[error("a sync is already in progress (marked at {since})")]
    SyncInProgress { since: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Msg(String),
}
