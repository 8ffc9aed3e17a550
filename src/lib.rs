use slog::o;
use slog::Drain;
use std::env;

/// Build an `Error::Msg` from a format string
#[macro_export]
macro_rules! se {
    ($($arg:tt)*) => {{
        $crate::Error::Msg(format!($($arg)*))
    }};
}

/// Shorthand for building json responses inside tide handlers
#[macro_export]
macro_rules! resp {
    (json => $obj:expr) => {{
        tide::Response::builder(200)
            .content_type(tide::http::mime::JSON)
            .body(tide::Body::from_json(&$obj)?)
            .build()
    }};
    (status => $status:expr, message => $msg:expr) => {{
        tide::Response::builder($status)
            .content_type(tide::http::mime::JSON)
            .body(serde_json::json!({ "error": $msg }))
            .build()
    }};
}

pub mod catalog;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod import;
pub mod lastfm;
pub mod logging;
pub mod models;
pub mod service;
pub mod stats;
pub mod store;
pub mod sync;
pub mod tabular;
pub mod timestamp;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};

fn env_or(k: &str, default: &str) -> String {
    env::var(k).unwrap_or_else(|_| default.to_string())
}

lazy_static::lazy_static! {
    // The "base" logger that all crates should branch off of
    pub static ref BASE_LOG: slog::Logger = {
        let level: slog::Level = env_or("LOG_LEVEL", "INFO")
                .parse()
                .expect("invalid log_level");
        let format = env_or("LOG_FORMAT", "json").to_lowercase().trim().to_string();
        if format == "pretty" {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::CompactFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        } else {
            let drain = slog_json::Json::default(std::io::stderr()).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        }
    };

    // Base logger
    pub static ref LOG: slog::Logger = BASE_LOG.new(slog::o!("app" => "listening"));
}
