/*!
Incremental sync from a paginated scrobble source

Pages are pulled one at a time, newest first, until the source runs
out, the page budget is spent, or an event at or before the stored
high-water mark shows up. Every write is idempotent, so re-running a
sync over the same events is harmless.
*/
use std::time::Duration;

use slog::o;

use crate::catalog::{self, CountMode};
use crate::config::Config;
use crate::lastfm::{ScrobbleSource, SourceEvent};
use crate::models::NewScrobble;
use crate::store::Store;
use crate::{timestamp, utils, Result, LOG};

const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: u32,
    pub max_pages: u32,
    pub page_delay: Duration,
    /// stop at the stored high-water mark
    pub incremental: bool,
    pub stale_after_seconds: i64,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.sync_page_size,
            max_pages: config.sync_max_pages,
            page_delay: Duration::from_millis(config.sync_page_delay_ms),
            incremental: true,
            stale_after_seconds: config.sync_stale_after_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StopReason {
    /// reached an event already covered by the stored history
    ResumeBoundary,
    /// fetched the source's last page
    LastPage,
    /// fetched `max_pages` pages
    PageBudget,
    /// the source returned a page with no entries
    EmptyPage,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SyncReport {
    /// events handled, including ones that were already stored
    pub processed: usize,
    /// events that produced a new scrobble row
    pub inserted: usize,
    pub errors: usize,
    pub pages_fetched: u32,
    pub stopped: StopReason,
}

/// Settle the bookkeeping row for a finished run. A failed run, or a
/// failure to record success, leaves the row `failed` and the error is
/// handed back to the caller.
pub(crate) async fn finish_run<T>(
    store: &dyn Store,
    log: &slog::Logger,
    outcome: Result<T>,
    count: impl Fn(&T) -> usize,
    mode: CountMode,
) -> Result<T> {
    let err = match outcome {
        Ok(value) => {
            match catalog::complete_run(store, utils::now_seconds(), count(&value) as i64, mode)
                .await
            {
                Ok(()) => return Ok(value),
                Err(e) => {
                    slog::error!(log, "failed recording completed run"; "error" => %e);
                    e
                }
            }
        }
        Err(e) => e,
    };
    slog::error!(log, "run failed"; "error" => %err);
    if let Err(e) = catalog::fail_run(store, utils::now_seconds(), &err.to_string()).await {
        slog::error!(log, "failed recording failed run"; "error" => %e);
    }
    Err(err)
}

/// Run one sync. Refused with `Error::SyncInProgress` if another run is
/// active; any other run-level failure is recorded as `failed` and
/// returned.
pub async fn run_sync(
    store: &dyn Store,
    source: &dyn ScrobbleSource,
    opts: &SyncOptions,
) -> Result<SyncReport> {
    let log = LOG.new(o!(
        "run" => uuid::Uuid::new_v4().to_string(),
        "kind" => "sync",
    ));
    catalog::begin_run(store, utils::now_seconds(), opts.stale_after_seconds).await?;
    slog::info!(log, "starting sync"; "incremental" => opts.incremental, "max_pages" => opts.max_pages);
    let outcome = sync_pages(store, source, opts, &log).await;
    let report = finish_run(store, &log, outcome, |r| r.processed, CountMode::Add).await?;
    slog::info!(
        log, "sync completed";
        "processed" => report.processed,
        "inserted" => report.inserted,
        "errors" => report.errors,
        "pages" => report.pages_fetched,
        "stopped" => ?report.stopped,
    );
    Ok(report)
}

async fn sync_pages(
    store: &dyn Store,
    source: &dyn ScrobbleSource,
    opts: &SyncOptions,
    log: &slog::Logger,
) -> Result<SyncReport> {
    let mark = if opts.incremental {
        catalog::high_water_mark(store).await?
    } else {
        None
    };
    match mark {
        Some(mark) => slog::info!(log, "resuming after high-water mark"; "mark" => utils::fmt_seconds(mark)),
        None => slog::info!(log, "no high-water mark, fetching all available history"),
    }
    // re-reported on page 1 if it's still playing
    let cleared = catalog::clear_live_scrobbles(store).await?;
    if cleared > 0 {
        slog::debug!(log, "cleared now-playing row"; "rows" => cleared);
    }

    let mut report = SyncReport {
        processed: 0,
        inserted: 0,
        errors: 0,
        pages_fetched: 0,
        stopped: StopReason::PageBudget,
    };
    let mut page = 1;
    while page <= opts.max_pages {
        if page > 1 {
            async_std::task::sleep(opts.page_delay).await;
        }
        slog::debug!(log, "fetching page"; "page" => page);
        let fetched = source.fetch_page(page, opts.page_size).await?;
        report.pages_fetched += 1;
        report.errors += fetched.malformed;
        if fetched.events.is_empty() && fetched.malformed == 0 {
            report.stopped = StopReason::EmptyPage;
            return Ok(report);
        }

        for event in &fetched.events {
            let played_at = event_time(event, log);
            if let Some(mark) = mark {
                if played_at <= mark {
                    slog::info!(
                        log, "reached previously synced events";
                        "played_at" => utils::fmt_seconds(played_at),
                    );
                    report.stopped = StopReason::ResumeBoundary;
                    return Ok(report);
                }
            }
            match record_event(store, event, played_at).await {
                Ok(inserted) => {
                    report.processed += 1;
                    if inserted {
                        report.inserted += 1;
                    }
                    if report.processed % PROGRESS_EVERY == 0 {
                        slog::info!(log, "sync progress"; "processed" => report.processed);
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    slog::error!(
                        log, "error processing event";
                        "artist" => &event.artist_name,
                        "track" => &event.name,
                        "error" => %e,
                    );
                }
            }
        }

        slog::info!(log, "completed page"; "page" => page, "total_pages" => fetched.total_pages);
        if page >= fetched.total_pages {
            report.stopped = StopReason::LastPage;
            return Ok(report);
        }
        page += 1;
    }
    Ok(report)
}

/// Now-playing events carry no time of their own and are stamped with
/// the current time. Their row is replaced on every run, never added to.
fn event_time(event: &SourceEvent, log: &slog::Logger) -> i64 {
    match &event.timestamp_token {
        Some(token) => timestamp::normalize(token),
        None => {
            if !event.is_live {
                slog::warn!(log, "event has no timestamp, using current time"; "track" => &event.name);
            }
            utils::now_seconds()
        }
    }
}

async fn record_event(store: &dyn Store, event: &SourceEvent, played_at: i64) -> Result<bool> {
    let artist_id = catalog::find_or_create_artist(
        store,
        &event.artist_name,
        event.artist_external_id.as_deref(),
    )
    .await?;
    let track_id = catalog::find_or_create_track(
        store,
        artist_id,
        &event.name,
        event.album.as_deref(),
        event.external_id.as_deref(),
    )
    .await?;
    catalog::insert_scrobble(
        store,
        &NewScrobble {
            track_id,
            artist_id,
            played_at,
            source_timestamp: event.timestamp_token.clone(),
            is_live: event.is_live,
        },
    )
    .await
}
