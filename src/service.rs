use std::sync::Arc;
use std::time::Duration;

use crate::lastfm::LastfmClient;
use crate::stats::{self, StatsWindow};
use crate::store::Store;
use crate::sync::{self, SyncOptions};
use crate::{catalog, resp, utils, Config, LOG};

#[derive(Clone)]
pub struct Context {
    store: Arc<dyn Store>,
}

pub fn app(store: Arc<dyn Store>) -> tide::Server<Context> {
    let mut app = tide::with_state(Context { store });
    app.at("/api/healthz").get(healthz);
    app.at("/api/listening-stats").get(listening_stats);
    app.at("/api/sync-status").get(sync_status);
    app.with(crate::logging::LogMiddleware::new());
    app
}

pub async fn start(config: &Config, store: Arc<dyn Store>) -> crate::Result<()> {
    if config.sync_interval_seconds > 0 {
        let source = LastfmClient::from_config(config)?;
        async_std::task::spawn(background_sync(
            store.clone(),
            source,
            SyncOptions::from_config(config),
            Duration::from_secs(config.sync_interval_seconds),
        ));
    }
    let app = app(store);
    slog::info!(LOG, "running at {}", config.host());
    app.listen(config.host()).await?;
    Ok(())
}

async fn background_sync(
    store: Arc<dyn Store>,
    source: LastfmClient,
    opts: SyncOptions,
    interval: Duration,
) {
    slog::info!(LOG, "background sync enabled"; "interval_seconds" => interval.as_secs());
    loop {
        match sync::run_sync(&*store, &source, &opts).await {
            Ok(report) => slog::info!(
                LOG, "background sync finished";
                "processed" => report.processed,
                "inserted" => report.inserted,
                "errors" => report.errors,
            ),
            Err(e) => slog::error!(LOG, "background sync failed"; "error" => %e),
        }
        async_std::task::sleep(interval).await;
    }
}

async fn healthz(_req: tide::Request<Context>) -> tide::Result {
    Ok(tide::Response::builder(200)
        .content_type(tide::http::mime::PLAIN)
        .header("cache-control", "no-cache")
        .body("OK")
        .build())
}

#[derive(serde::Deserialize)]
struct StatsQuery {
    days: Option<u32>,
}

async fn listening_stats(req: tide::Request<Context>) -> tide::Result {
    let days = match req.query::<StatsQuery>() {
        Ok(StatsQuery { days: None }) => StatsWindow::default().days,
        Ok(StatsQuery { days: Some(days) }) if days > 0 => days,
        _ => {
            return Ok(resp!(status => 400, message => "days must be a positive integer"));
        }
    };
    let window = StatsWindow {
        days,
        ..StatsWindow::default()
    };
    match stats::listening_stats(&*req.state().store, utils::now_seconds(), window).await {
        Ok(stats) => {
            let mut resp = resp!(json => stats);
            resp.insert_header("cache-control", "public, max-age=300");
            Ok(resp)
        }
        Err(e) => {
            slog::error!(LOG, "stats query error"; "error" => %e);
            Ok(resp!(status => 500, message => "Failed to fetch stats"))
        }
    }
}

async fn sync_status(req: tide::Request<Context>) -> tide::Result {
    match catalog::sync_metadata(&*req.state().store).await {
        Ok(meta) => Ok(resp!(json => meta)),
        Err(e) => {
            slog::error!(LOG, "sync status query error"; "error" => %e);
            Ok(resp!(status => 500, message => "Failed to fetch sync status"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{temp_store, Row, Scalar};
    use tide::http::{Method, Request, Response, Url};

    struct BrokenStore;

    #[async_trait::async_trait]
    impl Store for BrokenStore {
        async fn execute(&self, _sql: &str, _params: &[Scalar]) -> crate::Result<Vec<Row>> {
            Err(crate::Error::Store("unreachable".to_string()))
        }
    }

    async fn get(app: &tide::Server<Context>, path: &str) -> (u16, Option<String>, serde_json::Value) {
        let url = Url::parse(&format!("http://localhost{}", path)).unwrap();
        let mut res: Response = app.respond(Request::new(Method::Get, url)).await.unwrap();
        let cache = res.header("cache-control").map(|h| h.as_str().to_string());
        let body = res.body_string().await.unwrap();
        let json = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
        (u16::from(res.status()), cache, json)
    }

    #[async_std::test]
    async fn healthz_is_plain_ok() {
        let (_dir, store) = temp_store().await;
        let app = app(Arc::new(store));
        let (status, cache, body) = get(&app, "/api/healthz").await;
        assert_eq!(status, 200);
        assert_eq!(cache.as_deref(), Some("no-cache"));
        assert_eq!(body, serde_json::json!("OK"));
    }

    #[async_std::test]
    async fn stats_payload() {
        let (_dir, store) = temp_store().await;
        let app = app(Arc::new(store));
        let (status, cache, body) = get(&app, "/api/listening-stats").await;
        assert_eq!(status, 200);
        assert_eq!(cache.as_deref(), Some("public, max-age=300"));
        assert_eq!(body["last30Days"]["totalScrobbles"], 0);
        assert_eq!(body["allTime"]["topArtist"], serde_json::Value::Null);
        assert!(body["charts"]["listeningByHour"].is_array());

        let (status, _, _) = get(&app, "/api/listening-stats?days=7").await;
        assert_eq!(status, 200);
        let (status, _, body) = get(&app, "/api/listening-stats?days=soon").await;
        assert_eq!(status, 400);
        assert!(body["error"].is_string());
    }

    #[async_std::test]
    async fn store_failures_degrade_to_an_error_payload() {
        let app = app(Arc::new(BrokenStore));
        let (status, _, body) = get(&app, "/api/listening-stats").await;
        assert_eq!(status, 500);
        assert_eq!(body, serde_json::json!({"error": "Failed to fetch stats"}));
        let (status, _, _) = get(&app, "/api/sync-status").await;
        assert_eq!(status, 500);
    }

    #[async_std::test]
    async fn sync_status_reports_the_metadata_row() {
        let (_dir, store) = temp_store().await;
        catalog::begin_run(&store, 1000, 3600).await.unwrap();
        catalog::fail_run(&store, 1010, "boom").await.unwrap();
        let app = app(Arc::new(store));
        let (status, _, body) = get(&app, "/api/sync-status").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["last_error"], "boom");
        assert_eq!(body["updated_at"], 1010);
    }
}
