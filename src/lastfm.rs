/*!
The paginated play-event source

`ScrobbleSource` is what the sync run pulls from. `LastfmClient` is the
real implementation over `user.getrecenttracks`.
*/
use crate::config::Config;
use crate::{Error, Result, LOG};

/// One play event as reported by the source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEvent {
    pub name: String,
    pub artist_name: String,
    pub artist_external_id: Option<String>,
    pub album: Option<String>,
    pub external_id: Option<String>,
    /// raw timestamp, absent for now-playing events
    pub timestamp_token: Option<String>,
    pub is_live: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourcePage {
    /// newest first
    pub events: Vec<SourceEvent>,
    /// entries on the page that could not be read as events
    pub malformed: usize,
    pub page: u32,
    pub total_pages: u32,
    pub total_events: u64,
}

#[async_trait::async_trait]
pub trait ScrobbleSource: Send + Sync {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<SourcePage>;
}

pub struct LastfmClient {
    base_url: String,
    api_key: String,
    username: String,
}

#[derive(serde::Serialize)]
struct RecentTracksQuery<'a> {
    method: &'static str,
    user: &'a str,
    api_key: &'a str,
    format: &'static str,
    limit: u32,
    page: u32,
}

#[derive(serde::Deserialize, Debug)]
struct RecentTracksResponse {
    recenttracks: RecentTracks,
}

#[derive(serde::Deserialize, Debug)]
struct RecentTracks {
    #[serde(default)]
    track: OneOrMany,
    #[serde(rename = "@attr")]
    attr: PageAttr,
}

/// `track` is an array, except when a page holds a single entry
#[derive(serde::Deserialize, Debug)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(vec![])
    }
}

impl OneOrMany {
    fn into_vec(self) -> Vec<serde_json::Value> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(v) => vec![v],
        }
    }
}

#[derive(serde::Deserialize, Debug)]
struct PageAttr {
    #[serde(deserialize_with = "lenient_u64")]
    page: u64,
    #[serde(rename = "totalPages", deserialize_with = "lenient_u64")]
    total_pages: u64,
    #[serde(deserialize_with = "lenient_u64")]
    total: u64,
}

#[derive(serde::Deserialize, Debug)]
struct TextNode {
    #[serde(rename = "#text", default)]
    text: String,
    #[serde(default)]
    mbid: Option<String>,
}

#[derive(serde::Deserialize, Debug)]
struct DateNode {
    uts: serde_json::Value,
}

#[derive(serde::Deserialize, Debug)]
struct NowPlaying {
    #[serde(default)]
    nowplaying: Option<String>,
}

#[derive(serde::Deserialize, Debug)]
struct LastfmTrack {
    name: String,
    artist: TextNode,
    #[serde(default)]
    album: Option<TextNode>,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    date: Option<DateNode>,
    #[serde(rename = "@attr", default)]
    attr: Option<NowPlaying>,
}

#[derive(serde::Deserialize, Debug)]
struct ApiError {
    error: i64,
    message: String,
}

/// Page counters come back as strings, but accept numbers too
fn lenient_u64<'de, D>(d: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v: serde_json::Value = serde::Deserialize::deserialize(d)?;
    match &v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| serde::de::Error::custom(format!("expected a count, got {}", v)))
}

fn blank_to_none(s: Option<String>) -> Option<String> {
    crate::utils::non_empty(s.as_deref())
}

impl LastfmTrack {
    fn into_event(self) -> Result<SourceEvent> {
        let artist_name = self.artist.text.trim().to_string();
        let name = self.name.trim().to_string();
        if artist_name.is_empty() || name.is_empty() {
            return Err(Error::Source("event missing artist or track name".into()));
        }
        let timestamp_token = match self.date.map(|d| d.uts) {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let is_live = self
            .attr
            .and_then(|a| a.nowplaying)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(SourceEvent {
            name,
            artist_name,
            artist_external_id: blank_to_none(self.artist.mbid),
            album: self.album.and_then(|a| blank_to_none(Some(a.text))),
            external_id: blank_to_none(self.mbid),
            timestamp_token,
            is_live,
        })
    }
}

/// Read a `user.getrecenttracks` body into a page. Entries that don't
/// decode are counted rather than failing the page.
pub fn parse_page(body: serde_json::Value) -> Result<SourcePage> {
    if body.get("error").is_some() {
        let err: ApiError = serde_json::from_value(body)
            .map_err(|e| Error::Source(format!("unreadable error response {}", e)))?;
        return Err(Error::Source(format!(
            "last.fm error {}: {}",
            err.error, err.message
        )));
    }
    let resp: RecentTracksResponse = serde_json::from_value(body)
        .map_err(|e| Error::Source(format!("unexpected response shape {}", e)))?;
    let mut page = SourcePage {
        page: resp.recenttracks.attr.page as u32,
        total_pages: resp.recenttracks.attr.total_pages as u32,
        total_events: resp.recenttracks.attr.total,
        ..SourcePage::default()
    };
    for raw in resp.recenttracks.track.into_vec() {
        let event = serde_json::from_value::<LastfmTrack>(raw)
            .map_err(Error::from)
            .and_then(LastfmTrack::into_event);
        match event {
            Ok(event) => page.events.push(event),
            Err(e) => {
                slog::warn!(LOG, "skipping malformed event"; "page" => page.page, "error" => %e);
                page.malformed += 1;
            }
        }
    }
    Ok(page)
}

impl LastfmClient {
    pub fn new(base_url: &str, api_key: &str, username: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            username: username.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        match (&config.lastfm_api_key, &config.lastfm_username) {
            (Some(key), Some(user)) => Ok(Self::new(&config.lastfm_base_url, key, user)),
            (key, user) => Err(Error::Config {
                missing: [("LASTFM_API_KEY", key), ("LASTFM_USERNAME", user)]
                    .iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(k, _)| k.to_string())
                    .collect(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ScrobbleSource for LastfmClient {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<SourcePage> {
        let query = RecentTracksQuery {
            method: "user.getrecenttracks",
            user: &self.username,
            api_key: &self.api_key,
            format: "json",
            limit: page_size,
            page,
        };
        let mut resp = surf::get(self.base_url.as_str())
            .query(&query)
            .map_err(|e| Error::Source(format!("query encoding error {}", e)))?
            .send()
            .await
            .map_err(|e| Error::Source(format!("recent tracks request error {}", e)))?;
        let status = resp.status();
        let body: serde_json::Value = match resp.body_json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(Error::Source(format!("recent tracks json error {}", e)))
            }
            Err(_) => {
                return Err(Error::Source(format!(
                    "recent tracks request failed: {}",
                    status
                )))
            }
        };
        if !status.is_success() && body.get("error").is_none() {
            return Err(Error::Source(format!(
                "recent tracks request failed: {}",
                status
            )));
        }
        parse_page(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_a_page() {
        let page = parse_page(json!({
            "recenttracks": {
                "track": [
                    {
                        "artist": {"mbid": "", "#text": "Air"},
                        "album": {"mbid": "", "#text": "Moon Safari"},
                        "name": "La Femme d'Argent",
                        "mbid": "abc",
                        "@attr": {"nowplaying": "true"}
                    },
                    {
                        "artist": {"mbid": "b0c1", "#text": "Boards of Canada"},
                        "album": {"mbid": "", "#text": ""},
                        "name": "Roygbiv",
                        "mbid": "",
                        "date": {"uts": "1136073600", "#text": "01 Jan 2006, 00:00"}
                    }
                ],
                "@attr": {"user": "u", "page": "1", "perPage": "200", "totalPages": "7", "total": "1301"}
            }
        }))
        .unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 7);
        assert_eq!(page.total_events, 1301);
        assert_eq!(page.malformed, 0);
        assert_eq!(page.events.len(), 2);

        let live = &page.events[0];
        assert!(live.is_live);
        assert_eq!(live.timestamp_token, None);
        assert_eq!(live.album.as_deref(), Some("Moon Safari"));
        assert_eq!(live.artist_external_id, None);
        assert_eq!(live.external_id.as_deref(), Some("abc"));

        let played = &page.events[1];
        assert!(!played.is_live);
        assert_eq!(played.timestamp_token.as_deref(), Some("1136073600"));
        assert_eq!(played.album, None);
        assert_eq!(played.artist_external_id.as_deref(), Some("b0c1"));
    }

    #[test]
    fn single_track_pages_and_numeric_counters() {
        let page = parse_page(json!({
            "recenttracks": {
                "track": {
                    "artist": {"#text": "Air"},
                    "name": "Talisman",
                    "date": {"uts": 1136073600}
                },
                "@attr": {"page": 3, "totalPages": 3, "total": 401}
            }
        }))
        .unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.events[0].timestamp_token.as_deref(), Some("1136073600"));
    }

    #[test]
    fn malformed_entries_are_counted() {
        let page = parse_page(json!({
            "recenttracks": {
                "track": [
                    {"name": "no artist"},
                    {"artist": {"#text": "  "}, "name": "blank artist"},
                    {"artist": {"#text": "Air"}, "name": "Talisman", "date": {"uts": "1136073600"}}
                ],
                "@attr": {"page": "1", "totalPages": "1", "total": "3"}
            }
        }))
        .unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.malformed, 2);
    }

    #[test]
    fn empty_history() {
        let page = parse_page(json!({
            "recenttracks": {
                "track": [],
                "@attr": {"page": "1", "totalPages": "0", "total": "0"}
            }
        }))
        .unwrap();
        assert!(page.events.is_empty());
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn api_errors_are_source_errors() {
        let err = parse_page(json!({"error": 6, "message": "User not found"})).unwrap_err();
        match err {
            Error::Source(msg) => assert!(msg.contains("User not found")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_page(json!({"unexpected": true})),
            Err(Error::Source(_))
        ));
    }
}
