use std::time::Instant;

use crate::LOG;

/// Request logging through the app's slog logger
#[derive(Debug, Default, Clone)]
pub struct LogMiddleware {
    _priv: (),
}

impl LogMiddleware {
    pub fn new() -> Self {
        Self { _priv: () }
    }
}

#[tide::utils::async_trait]
impl<State: Clone + Send + Sync + 'static> tide::Middleware<State> for LogMiddleware {
    async fn handle(&self, req: tide::Request<State>, next: tide::Next<'_, State>) -> tide::Result {
        let method = req.method().to_string();
        let path = req.url().path().to_string();
        let start = Instant::now();
        let response = next.run(req).await;
        let status = u16::from(response.status());
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if let Some(error) = response.error() {
            slog::error!(
                LOG, "request error";
                "method" => method, "path" => path, "status" => status,
                "elapsed_ms" => elapsed_ms, "error" => %error,
            );
        } else if status >= 500 {
            slog::error!(
                LOG, "request failed";
                "method" => method, "path" => path, "status" => status, "elapsed_ms" => elapsed_ms,
            );
        } else if status >= 400 {
            slog::warn!(
                LOG, "request rejected";
                "method" => method, "path" => path, "status" => status, "elapsed_ms" => elapsed_ms,
            );
        } else {
            slog::info!(
                LOG, "request";
                "method" => method, "path" => path, "status" => status, "elapsed_ms" => elapsed_ms,
            );
        }
        Ok(response)
    }
}
