/*!
Delimited scrobble exports

Exports from different tools name their columns differently, so the
artist/track/album/timestamp roles are detected from the header row.
*/
use std::convert::TryFrom;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub artist: String,
    pub track: String,
    pub album: Option<String>,
    /// raw, un-normalized timestamp token
    pub timestamp: String,
}

/// How generously timestamp headers are recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMatching {
    /// `uts`, `utc_time`, or anything containing `time`
    Strict,
    /// `Strict`, plus anything containing `date` or `played`
    Loose,
}

impl Default for HeaderMatching {
    fn default() -> Self {
        HeaderMatching::Loose
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub delimiter: char,
    pub matching: HeaderMatching,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            matching: HeaderMatching::default(),
        }
    }
}

/// Column indexes resolved from a header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub artist: usize,
    pub track: usize,
    pub album: Option<usize>,
    pub timestamp: usize,
}

const ARTIST_KEYS: &[&str] = &["artist"];
const TRACK_KEYS: &[&str] = &["track", "song", "name"];
const ALBUM_KEYS: &[&str] = &["album"];
const TIMESTAMP_EXACT: &[&str] = &["uts", "utc_time"];
const TIMESTAMP_STRICT: &[&str] = &["time"];
const TIMESTAMP_LOOSE: &[&str] = &["time", "date", "played"];

fn reader(content: &str, delimiter: char) -> Result<csv::Reader<&[u8]>> {
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| se!("delimiter must be a single ascii character, got {:?}", delimiter))?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes()))
}

/// Split delimited content into records of cleaned fields. A `"`-quoted
/// field may hold the delimiter or a line break. Records with no
/// non-blank field are dropped.
pub fn split_records(content: &str, delimiter: char) -> Result<Vec<Vec<String>>> {
    let mut records = vec![];
    for record in reader(content, delimiter)?.records() {
        let fields = record?.iter().map(clean_field).collect::<Vec<_>>();
        if fields.iter().all(String::is_empty) {
            continue;
        }
        records.push(fields);
    }
    Ok(records)
}

/// Fields of the first record in `line`
pub fn split_line(line: &str, delimiter: char) -> Result<Vec<String>> {
    Ok(split_records(line, delimiter)?
        .into_iter()
        .next()
        .unwrap_or_default())
}

/// `'` quoting isn't understood by the reader, strip it here
fn clean_field(s: &str) -> String {
    let s = s.trim();
    let s = s.strip_prefix(|c| c == '"' || c == '\'').unwrap_or(s);
    let s = s.strip_suffix(|c| c == '"' || c == '\'').unwrap_or(s);
    s.trim().to_string()
}

/// Find the first header (left to right) equal to one of `exact`, else
/// the first containing one of `contains`. Headers already claimed by
/// another role are passed over.
fn find_role(headers: &[String], claimed: &[usize], exact: &[&str], contains: &[&str]) -> Option<usize> {
    let open = |i: &usize| !claimed.contains(i);
    (0..headers.len())
        .filter(open)
        .find(|&i| exact.iter().any(|k| headers[i] == *k))
        .or_else(|| {
            (0..headers.len())
                .filter(open)
                .find(|&i| contains.iter().any(|k| headers[i].contains(k)))
        })
}

/// Resolve column roles from raw header names
pub fn detect_columns(headers: &[String], matching: HeaderMatching) -> Result<Columns> {
    let lowered = headers
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect::<Vec<_>>();
    let mut claimed = vec![];

    let artist = find_role(&lowered, &claimed, ARTIST_KEYS, ARTIST_KEYS);
    claimed.extend(artist);
    let track = find_role(&lowered, &claimed, TRACK_KEYS, TRACK_KEYS);
    claimed.extend(track);
    let album = find_role(&lowered, &claimed, ALBUM_KEYS, ALBUM_KEYS);
    claimed.extend(album);
    let timestamp_keys = match matching {
        HeaderMatching::Strict => TIMESTAMP_STRICT,
        HeaderMatching::Loose => TIMESTAMP_LOOSE,
    };
    let timestamp = find_role(&lowered, &claimed, TIMESTAMP_EXACT, timestamp_keys);

    match (artist, track, timestamp) {
        (Some(artist), Some(track), Some(timestamp)) => Ok(Columns {
            artist,
            track,
            album,
            timestamp,
        }),
        _ => {
            let mut roles = vec![];
            if artist.is_none() {
                roles.push("artist");
            }
            if track.is_none() {
                roles.push("track");
            }
            if timestamp.is_none() {
                roles.push("timestamp");
            }
            Err(Error::MissingColumn {
                roles,
                headers: lowered,
            })
        }
    }
}

/// Parse a full export: header line first, then one play per line.
/// Rows with a blank artist or track are skipped.
pub fn parse(content: &str, opts: &ParseOptions) -> Result<Vec<CsvRow>> {
    let mut records = split_records(content, opts.delimiter)?.into_iter();
    let headers = records.next().unwrap_or_default();
    let columns = detect_columns(&headers, opts.matching)?;

    let rows = records
        .filter_map(|values| {
            let field = |i: usize| values.get(i).cloned().unwrap_or_default();
            let artist = field(columns.artist);
            let track = field(columns.track);
            if artist.is_empty() || track.is_empty() {
                return None;
            }
            Some(CsvRow {
                artist,
                track,
                album: columns.album.map(field).filter(|a| !a.is_empty()),
                timestamp: field(columns.timestamp),
            })
        })
        .collect();
    Ok(rows)
}
