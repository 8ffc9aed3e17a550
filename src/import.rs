/*!
CSV imports, either written straight into a store or rendered as a
standalone SQL script for bulk loading a fresh database
*/
use std::collections::HashMap;
use std::fmt::Write as _;

use slog::o;

use crate::catalog::{self, CountMode};
use crate::dedupe::Deduplicated;
use crate::models::NewScrobble;
use crate::store::Store;
use crate::sync::finish_run;
use crate::tabular::CsvRow;
use crate::{se, timestamp, utils, Result, LOG};

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ImportReport {
    pub rows: usize,
    /// rows written or found already present
    pub processed: usize,
    /// rows that produced a new scrobble
    pub inserted: usize,
    pub errors: usize,
    pub artists: usize,
    pub tracks: usize,
}

impl ImportReport {
    /// rows that were already stored
    pub fn skipped(&self) -> usize {
        self.processed - self.inserted
    }
}

/// Import parsed rows. The bookkeeping row ends `completed` with the
/// synced count set to this import's processed rows, or `failed`.
pub async fn run_import(
    store: &dyn Store,
    rows: &[CsvRow],
    stale_after_seconds: i64,
) -> Result<ImportReport> {
    let log = LOG.new(o!(
        "run" => uuid::Uuid::new_v4().to_string(),
        "kind" => "csv_import",
    ));
    catalog::begin_run(store, utils::now_seconds(), stale_after_seconds).await?;
    slog::info!(log, "starting import"; "rows" => rows.len());
    let outcome = import_rows(store, rows, &log).await;
    let report = finish_run(store, &log, outcome, |r| r.processed, CountMode::Replace).await?;
    slog::info!(
        log, "import completed";
        "processed" => report.processed,
        "inserted" => report.inserted,
        "errors" => report.errors,
    );
    Ok(report)
}

async fn import_rows(
    store: &dyn Store,
    rows: &[CsvRow],
    log: &slog::Logger,
) -> Result<ImportReport> {
    let dedup = Deduplicated::from_rows(rows);
    let mut report = ImportReport {
        rows: rows.len(),
        artists: dedup.artists().len(),
        tracks: dedup.tracks().len(),
        ..ImportReport::default()
    };
    slog::info!(
        log, "deduplicated rows";
        "artists" => report.artists,
        "tracks" => report.tracks,
    );

    // one find-or-create per distinct entity; rows whose entity failed
    // are counted as errors below
    let mut artist_ids = HashMap::with_capacity(dedup.artists().len());
    for artist in dedup.artists() {
        match catalog::find_or_create_artist(store, &artist.name, None).await {
            Ok(id) => {
                artist_ids.insert(artist.id, id);
            }
            Err(e) => slog::error!(log, "error creating artist"; "artist" => &artist.name, "error" => %e),
        }
    }
    let mut track_ids = HashMap::with_capacity(dedup.tracks().len());
    for track in dedup.tracks() {
        let artist_id = match artist_ids.get(&track.artist_id) {
            Some(id) => *id,
            None => continue,
        };
        match catalog::find_or_create_track(store, artist_id, &track.name, track.album.as_deref(), None)
            .await
        {
            Ok(id) => {
                track_ids.insert(track.id, (id, artist_id));
            }
            Err(e) => slog::error!(log, "error creating track"; "track" => &track.name, "error" => %e),
        }
    }

    for (i, row) in rows.iter().enumerate() {
        let ids = dedup
            .track(&row.artist, &row.track)
            .and_then(|t| track_ids.get(&t.id));
        let result = match ids {
            Some(&(track_id, artist_id)) => {
                let scrobble = NewScrobble {
                    track_id,
                    artist_id,
                    played_at: timestamp::normalize(&row.timestamp),
                    source_timestamp: Some(row.timestamp.clone()),
                    is_live: false,
                };
                catalog::insert_scrobble(store, &scrobble).await
            }
            None => Err(se!("no stored track for {} - {}", row.artist, row.track)),
        };
        match result {
            Ok(inserted) => {
                report.processed += 1;
                if inserted {
                    report.inserted += 1;
                }
            }
            Err(e) => {
                report.errors += 1;
                slog::error!(
                    log, "error importing row";
                    "row" => i + 1,
                    "artist" => &row.artist,
                    "track" => &row.track,
                    "error" => %e,
                );
            }
        }
        if (i + 1) % PROGRESS_EVERY == 0 {
            slog::info!(log, "import progress"; "rows" => i + 1, "of" => rows.len());
        }
    }
    Ok(report)
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn quote_opt(s: Option<&str>) -> String {
    s.map(quote).unwrap_or_else(|| "NULL".to_string())
}

/// Render rows as a self-contained SQL script against a fresh schema.
/// Identifiers come from the deduplicator, so the output is
/// reproducible for the same input.
pub fn sql_dump(rows: &[CsvRow], now: i64) -> String {
    let dedup = Deduplicated::from_rows(rows);
    let mut out = String::new();
    // writing to a String can't fail
    let _ = writeln!(out, "-- listening history import");
    let _ = writeln!(out, "-- records: {}", rows.len());
    let _ = writeln!(out, "-- generated at: {}", utils::fmt_seconds(now));

    let _ = writeln!(out, "\n-- artists");
    for artist in dedup.artists() {
        let _ = writeln!(
            out,
            "INSERT INTO artists (id, name, created_at) VALUES ({}, {}, {});",
            artist.id,
            quote(&artist.name),
            now
        );
    }

    let _ = writeln!(out, "\n-- tracks");
    for track in dedup.tracks() {
        let _ = writeln!(
            out,
            "INSERT INTO tracks (id, name, artist_id, album, created_at) VALUES ({}, {}, {}, {}, {});",
            track.id,
            quote(&track.name),
            track.artist_id,
            quote_opt(track.album.as_deref()),
            now
        );
    }

    let _ = writeln!(out, "\n-- scrobbles");
    for row in rows {
        // every row was fed to the deduplicator above
        let track = match dedup.track(&row.artist, &row.track) {
            Some(t) => t,
            None => continue,
        };
        let _ = writeln!(
            out,
            "INSERT INTO scrobbles (track_id, artist_id, played_at, source_timestamp) VALUES ({}, {}, {}, {}) ON CONFLICT DO NOTHING;",
            track.id,
            track.artist_id,
            timestamp::normalize(&row.timestamp),
            quote(&row.timestamp)
        );
    }

    let _ = writeln!(out, "\n-- sync metadata");
    let _ = writeln!(
        out,
        "UPDATE sync_metadata SET status = 'completed', last_successful_sync = {now}, total_synced_count = {}, last_error = NULL, updated_at = {now} WHERE id = 1;",
        rows.len(),
        now = now
    );
    out
}
