/*!
Writes and bookkeeping against the normalized schema

Every write is an idempotent insert-if-absent: the store's unique
constraints (case-insensitive artist name, artist + case-insensitive
track name, track + played_at) do the deduplication.
*/
use crate::models::{Artist, NewScrobble, Scrobble, SyncMetadata, SyncStatus, Track};
use crate::store::{self, Store};
use crate::{params, utils, Error, Result};

/// Find the artist by case-insensitive name, creating it if absent.
/// An external id is attached only when the artist doesn't have one.
pub async fn find_or_create_artist(
    store: &dyn Store,
    name: &str,
    external_id: Option<&str>,
) -> Result<i64> {
    let row = store::fetch_one(
        store,
        "
        insert into artists (name, external_id, created_at)
        values (?, ?, ?)
        on conflict (name) do update set
            external_id = coalesce(artists.external_id, excluded.external_id)
        returning id
        ",
        &params![name, utils::non_empty(external_id), utils::now_seconds()],
    )
    .await?;
    row.int("id")
}

/// Find the artist's track by case-insensitive name, creating it if
/// absent. Album and external id are backfilled when missing.
pub async fn find_or_create_track(
    store: &dyn Store,
    artist_id: i64,
    name: &str,
    album: Option<&str>,
    external_id: Option<&str>,
) -> Result<i64> {
    let row = store::fetch_one(
        store,
        "
        insert into tracks (name, artist_id, album, external_id, created_at)
        values (?, ?, ?, ?, ?)
        on conflict (artist_id, name) do update set
            album = coalesce(tracks.album, excluded.album),
            external_id = coalesce(tracks.external_id, excluded.external_id)
        returning id
        ",
        &params![
            name,
            artist_id,
            utils::non_empty(album),
            utils::non_empty(external_id),
            utils::now_seconds()
        ],
    )
    .await?;
    row.int("id")
}

/// Drop the now-playing row. Returns how many rows went.
pub async fn clear_live_scrobbles(store: &dyn Store) -> Result<usize> {
    let rows = store
        .execute("delete from scrobbles where is_live = 1 returning id", &[])
        .await?;
    Ok(rows.len())
}

/// Record a play. Returns `false` when the (track, played_at) pair
/// already exists, in which case nothing is written. A live play takes
/// the place of any earlier live row, so at most one exists.
pub async fn insert_scrobble(store: &dyn Store, scrobble: &NewScrobble) -> Result<bool> {
    if scrobble.is_live {
        clear_live_scrobbles(store).await?;
    }
    let rows = store
        .execute(
            "
            insert into scrobbles (track_id, artist_id, played_at, source_timestamp, is_live)
            values (?, ?, ?, ?, ?)
            on conflict (track_id, played_at) do nothing
            returning id
            ",
            &params![
                scrobble.track_id,
                scrobble.artist_id,
                scrobble.played_at,
                scrobble.source_timestamp.clone(),
                scrobble.is_live
            ],
        )
        .await?;
    Ok(!rows.is_empty())
}

/// Latest stored play time, ignoring live now-playing rows whose time
/// is only an estimate. `None` for an empty store.
pub async fn high_water_mark(store: &dyn Store) -> Result<Option<i64>> {
    let row = store::fetch_one(
        store,
        "select max(played_at) as last_timestamp from scrobbles where is_live = 0",
        &[],
    )
    .await?;
    row.opt_int("last_timestamp")
}

pub async fn scrobble_count(store: &dyn Store) -> Result<i64> {
    store::fetch_one(store, "select count(*) as total from scrobbles", &[])
        .await?
        .int("total")
}

pub async fn artists(store: &dyn Store) -> Result<Vec<Artist>> {
    store::fetch_all(
        store,
        "select id, name, external_id from artists order by id",
        &[],
    )
    .await
}

pub async fn tracks(store: &dyn Store) -> Result<Vec<Track>> {
    store::fetch_all(
        store,
        "select id, name, artist_id, album, external_id from tracks order by id",
        &[],
    )
    .await
}

/// Every stored play, oldest first
pub async fn scrobbles(store: &dyn Store) -> Result<Vec<Scrobble>> {
    store::fetch_all(
        store,
        "
        select id, track_id, artist_id, played_at, source_timestamp, is_live
        from scrobbles order by played_at, id
        ",
        &[],
    )
    .await
}

// sync_metadata is a single row with the well-known id 1

async fn ensure_sync_metadata(store: &dyn Store) -> Result<()> {
    store
        .execute(
            "
            insert into sync_metadata (id, status, total_synced_count, updated_at)
            values (1, 'idle', 0, ?)
            on conflict (id) do nothing
            ",
            &params![utils::now_seconds()],
        )
        .await?;
    Ok(())
}

pub async fn sync_metadata(store: &dyn Store) -> Result<SyncMetadata> {
    ensure_sync_metadata(store).await?;
    store::fetch_one(
        store,
        "
        select status, last_successful_sync, total_synced_count, last_error, updated_at
        from sync_metadata where id = 1
        ",
        &[],
    )
    .await?
    .decode()
}

/// Mark a run as started. Refused with `Error::SyncInProgress` while
/// another run holds an `in_progress` marker younger than `stale_after`
/// seconds; an older marker is assumed to be from a crashed run.
pub async fn begin_run(store: &dyn Store, now: i64, stale_after: i64) -> Result<()> {
    ensure_sync_metadata(store).await?;
    let claimed = store
        .execute(
            "
            update sync_metadata
                set status = 'in_progress', updated_at = ?
                where id = 1 and (status != 'in_progress' or updated_at < ?)
            returning id
            ",
            &params![now, now - stale_after],
        )
        .await?;
    if claimed.is_empty() {
        let current = sync_metadata(store).await?;
        return Err(Error::SyncInProgress {
            since: current.updated_at,
        });
    }
    Ok(())
}

/// How a finished run's count folds into `total_synced_count`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// incremental syncs add to the running total
    Add,
    /// full imports replace it
    Replace,
}

pub async fn complete_run(store: &dyn Store, now: i64, count: i64, mode: CountMode) -> Result<()> {
    let sql = match mode {
        CountMode::Add => {
            "
            update sync_metadata
                set status = 'completed', last_successful_sync = ?,
                    total_synced_count = total_synced_count + ?,
                    last_error = null, updated_at = ?
                where id = 1
            "
        }
        CountMode::Replace => {
            "
            update sync_metadata
                set status = 'completed', last_successful_sync = ?,
                    total_synced_count = ?,
                    last_error = null, updated_at = ?
                where id = 1
            "
        }
    };
    store.execute(sql, &params![now, count, now]).await?;
    Ok(())
}

pub async fn fail_run(store: &dyn Store, now: i64, message: &str) -> Result<()> {
    store
        .execute(
            "
            update sync_metadata
                set status = ?, last_error = ?, updated_at = ?
                where id = 1
            ",
            &params![SyncStatus::Failed.as_str(), message, now],
        )
        .await?;
    Ok(())
}
