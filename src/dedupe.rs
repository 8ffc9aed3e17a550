/*!
Case-insensitive artist/track deduplication for one import

Identifiers are assigned in first-occurrence order starting at 1 and
are only stable within a single run. The first casing seen for an
artist or track is the one kept for display.
*/
use std::collections::HashMap;

use crate::tabular::CsvRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupArtist {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupTrack {
    pub id: u32,
    pub artist_id: u32,
    pub name: String,
    /// first non-empty album seen for this track
    pub album: Option<String>,
}

fn key(s: &str) -> String {
    s.to_lowercase()
}

#[derive(Debug, Default)]
pub struct Deduplicated {
    artists: Vec<DedupArtist>,
    tracks: Vec<DedupTrack>,
    artist_index: HashMap<String, usize>,
    track_index: HashMap<(String, String), usize>,
}

impl Deduplicated {
    pub fn from_rows(rows: &[CsvRow]) -> Self {
        let mut d = Self::default();
        for row in rows {
            let artist_key = key(&row.artist);
            let artist_pos = match d.artist_index.get(&artist_key) {
                Some(&pos) => pos,
                None => {
                    let pos = d.artists.len();
                    d.artists.push(DedupArtist {
                        id: pos as u32 + 1,
                        name: row.artist.clone(),
                    });
                    d.artist_index.insert(artist_key.clone(), pos);
                    pos
                }
            };
            let artist_id = d.artists[artist_pos].id;

            let track_key = (artist_key, key(&row.track));
            match d.track_index.get(&track_key) {
                Some(&pos) => {
                    let track = &mut d.tracks[pos];
                    if track.album.is_none() {
                        track.album = row.album.clone();
                    }
                }
                None => {
                    let pos = d.tracks.len();
                    d.tracks.push(DedupTrack {
                        id: pos as u32 + 1,
                        artist_id,
                        name: row.track.clone(),
                        album: row.album.clone(),
                    });
                    d.track_index.insert(track_key, pos);
                }
            }
        }
        d
    }

    /// Artists in identifier order
    pub fn artists(&self) -> &[DedupArtist] {
        &self.artists
    }

    /// Tracks in identifier order
    pub fn tracks(&self) -> &[DedupTrack] {
        &self.tracks
    }

    pub fn artist(&self, name: &str) -> Option<&DedupArtist> {
        self.artist_index.get(&key(name)).map(|&i| &self.artists[i])
    }

    pub fn track(&self, artist: &str, track: &str) -> Option<&DedupTrack> {
        self.track_index
            .get(&(key(artist), key(track)))
            .map(|&i| &self.tracks[i])
    }
}
