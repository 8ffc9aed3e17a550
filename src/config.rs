/*!
Environment configuration

Everything is read once by `Config::load` and then handed to the
constructors that need it. `Config::validate` is the single up-front
check of required values, run before any store or network I/O.
*/
use std::io::Read;
use std::{env, fs};

use crate::{se, Error, Result};

pub const D1_QUERY_URL: &str = "https://api.cloudflare.com/client/v4/accounts";
pub const LASTFM_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

fn env_opt(k: &str) -> Option<String> {
    env::var(k)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(k: &str, default: &str) -> String {
    env_opt(k).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(k: &str, default: T) -> Result<T> {
    match env_opt(k) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| se!("invalid {} value {:?}", k, v)),
    }
}

/// Where scrobble rows live
#[derive(Debug, Clone, PartialEq)]
pub enum StoreTarget {
    /// A local sqlite database, e.g. `sqlite:listening.db`
    Sqlite(String),
    /// A hosted sql service reachable through a json query endpoint
    Hosted { url: String, token: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    pub host: String,
    pub port: u16,
    pub log_format: String,
    pub log_level: String,
    pub store_url: Option<String>,
    pub store_api_token: Option<String>,
    pub d1_database_id: Option<String>,
    pub cloudflare_account_id: Option<String>,
    pub cloudflare_api_token: Option<String>,
    pub lastfm_api_key: Option<String>,
    pub lastfm_username: Option<String>,
    pub lastfm_base_url: String,
    pub sync_page_size: u32,
    pub sync_max_pages: u32,
    pub sync_page_delay_ms: u64,
    pub sync_stale_after_seconds: i64,
    pub sync_interval_seconds: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let version = fs::File::open("commit_hash.txt")
            .map(|mut f| {
                let mut s = String::new();
                f.read_to_string(&mut s).ok();
                s.trim().to_string()
            })
            .unwrap_or_else(|_| "unknown".to_string());
        Ok(Self {
            version,
            host: env_or("HOST", "localhost"),
            port: env_parse("PORT", 3030)?,
            log_format: env_or("LOG_FORMAT", "json").to_lowercase(),
            log_level: env_or("LOG_LEVEL", "INFO"),
            store_url: env_opt("STORE_URL"),
            store_api_token: env_opt("STORE_API_TOKEN"),
            d1_database_id: env_opt("D1_DATABASE_ID"),
            cloudflare_account_id: env_opt("CLOUDFLARE_ACCOUNT_ID"),
            cloudflare_api_token: env_opt("CLOUDFLARE_API_TOKEN"),
            lastfm_api_key: env_opt("LASTFM_API_KEY"),
            lastfm_username: env_opt("LASTFM_USERNAME"),
            lastfm_base_url: env_or("LASTFM_BASE_URL", LASTFM_BASE_URL),
            sync_page_size: env_parse("SYNC_PAGE_SIZE", 200)?,
            sync_max_pages: env_parse("SYNC_MAX_PAGES", 10)?,
            sync_page_delay_ms: env_parse("SYNC_PAGE_DELAY_MS", 250)?,
            sync_stale_after_seconds: env_parse("SYNC_STALE_AFTER_SECONDS", 3600)?,
            sync_interval_seconds: env_parse("SYNC_INTERVAL_SECONDS", 0)?,
        })
    }

    /// A config with nothing set beyond defaults
    pub fn empty() -> Self {
        Self {
            version: "unknown".to_string(),
            host: "localhost".to_string(),
            port: 3030,
            log_format: "json".to_string(),
            log_level: "INFO".to_string(),
            store_url: None,
            store_api_token: None,
            d1_database_id: None,
            cloudflare_account_id: None,
            cloudflare_api_token: None,
            lastfm_api_key: None,
            lastfm_username: None,
            lastfm_base_url: LASTFM_BASE_URL.to_string(),
            sync_page_size: 200,
            sync_max_pages: 10,
            sync_page_delay_ms: 250,
            sync_stale_after_seconds: 3600,
            sync_interval_seconds: 0,
        }
    }

    pub fn initialize(&self) {
        slog::info!(
            crate::LOG, "initialized config";
            "version" => &self.version,
            "host" => &self.host,
            "port" => &self.port,
            "log_format" => &self.log_format,
            "log_level" => &self.log_level,
            "sync_max_pages" => self.sync_max_pages,
            "sync_interval_seconds" => self.sync_interval_seconds,
        );
    }

    pub fn host(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check every value needed for a run up front, reporting all
    /// missing names at once. `needs_source` adds the Last.fm settings.
    pub fn validate(&self, needs_source: bool) -> Result<()> {
        let mut missing = match self.store_target() {
            Ok(_) => vec![],
            Err(Error::Config { missing }) => missing,
            Err(e) => return Err(e),
        };
        if needs_source {
            if self.lastfm_api_key.is_none() {
                missing.push("LASTFM_API_KEY".to_string());
            }
            if self.lastfm_username.is_none() {
                missing.push("LASTFM_USERNAME".to_string());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config { missing })
        }
    }

    /// Resolve the store from either `STORE_URL` or the cloudflare d1 triple
    pub fn store_target(&self) -> Result<StoreTarget> {
        if let Some(url) = &self.store_url {
            if url.starts_with("sqlite:") {
                return Ok(StoreTarget::Sqlite(url.clone()));
            }
            if url.starts_with("http://") || url.starts_with("https://") {
                return match &self.store_api_token {
                    Some(token) => Ok(StoreTarget::Hosted {
                        url: url.clone(),
                        token: token.clone(),
                    }),
                    None => Err(Error::Config {
                        missing: vec!["STORE_API_TOKEN".to_string()],
                    }),
                };
            }
            return Err(se!(
                "unsupported STORE_URL {:?}, expected sqlite: or http(s)://",
                url
            ));
        }

        let d1 = [
            ("D1_DATABASE_ID", &self.d1_database_id),
            ("CLOUDFLARE_ACCOUNT_ID", &self.cloudflare_account_id),
            ("CLOUDFLARE_API_TOKEN", &self.cloudflare_api_token),
        ];
        if d1.iter().all(|(_, v)| v.is_none()) {
            return Err(Error::Config {
                missing: vec!["STORE_URL".to_string()],
            });
        }
        let missing = d1
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(Error::Config { missing });
        }
        match (
            &self.d1_database_id,
            &self.cloudflare_account_id,
            &self.cloudflare_api_token,
        ) {
            (Some(db), Some(account), Some(token)) => Ok(StoreTarget::Hosted {
                url: format!("{}/{}/d1/database/{}/query", D1_QUERY_URL, account, db),
                token: token.clone(),
            }),
            _ => Err(se!("incomplete d1 configuration")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_reports_store_and_source() {
        let err = Config::empty().validate(true).unwrap_err();
        match err {
            Error::Config { missing } => assert_eq!(
                missing,
                vec!["STORE_URL", "LASTFM_API_KEY", "LASTFM_USERNAME"]
            ),
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn source_not_needed_for_csv_imports() {
        let mut config = Config::empty();
        config.store_url = Some("sqlite:listening.db".to_string());
        assert!(config.validate(false).is_ok());
        assert_eq!(
            config.store_target().unwrap(),
            StoreTarget::Sqlite("sqlite:listening.db".to_string())
        );
    }

    #[test]
    fn partial_d1_config_lists_missing_names() {
        let mut config = Config::empty();
        config.d1_database_id = Some("db".to_string());
        let err = config.validate(false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required configuration: CLOUDFLARE_ACCOUNT_ID, CLOUDFLARE_API_TOKEN"
        );
    }

    #[test]
    fn d1_config_builds_query_url() {
        let mut config = Config::empty();
        config.d1_database_id = Some("db".to_string());
        config.cloudflare_account_id = Some("acct".to_string());
        config.cloudflare_api_token = Some("tok".to_string());
        assert_eq!(
            config.store_target().unwrap(),
            StoreTarget::Hosted {
                url: "https://api.cloudflare.com/client/v4/accounts/acct/d1/database/db/query"
                    .to_string(),
                token: "tok".to_string(),
            }
        );
    }

    #[test]
    fn hosted_store_url_needs_token() {
        let mut config = Config::empty();
        config.store_url = Some("https://sql.example.com/query".to_string());
        let err = config.validate(false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required configuration: STORE_API_TOKEN"
        );
    }
}
