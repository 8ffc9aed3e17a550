#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Artist {
    pub id: i64,
    // display name, casing as first seen
    pub name: String,
    // musicbrainz id reported by last.fm, when there is one
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Track {
    pub id: i64,
    pub name: String,
    pub artist_id: i64,
    pub album: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scrobble {
    pub id: i64,
    pub track_id: i64,
    // denormalized from the track so aggregates can skip a join
    pub artist_id: i64,
    // unix seconds
    pub played_at: i64,
    // the source's own timestamp value, before normalization
    pub source_timestamp: Option<String>,
    #[serde(deserialize_with = "int_bool")]
    pub is_live: bool,
}

/// A play to be recorded, already resolved to store identifiers
#[derive(Debug, Clone, PartialEq)]
pub struct NewScrobble {
    pub track_id: i64,
    pub artist_id: i64,
    pub played_at: i64,
    pub source_timestamp: Option<String>,
    pub is_live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    InProgress,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

/// The single bookkeeping row for sync and import runs
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyncMetadata {
    pub status: SyncStatus,
    pub last_successful_sync: Option<i64>,
    pub total_synced_count: i64,
    pub last_error: Option<String>,
    pub updated_at: i64,
}

fn int_bool<'de, D>(d: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v: serde_json::Value = serde::Deserialize::deserialize(d)?;
    Ok(match v {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    })
}
