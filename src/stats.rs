/*!
Read-only listening statistics

Every aggregate is an independent query; they're issued concurrently and
gathered into one payload. Counts only include finished plays, the live
now-playing row shows up in the recent list alone.
*/
use serde::{Deserialize, Serialize};

use crate::store::{self, Store};
use crate::{params, Result};

const DAY_SECONDS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindow {
    /// trailing window for the `last30Days` group
    pub days: u32,
    /// trailing window for the daily series
    pub daily_days: u32,
}

impl Default for StatsWindow {
    fn default() -> Self {
        Self {
            days: 30,
            daily_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistPlays {
    pub name: String,
    pub play_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPlays {
    pub name: String,
    pub artist_name: String,
    pub play_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentScrobble {
    pub track_name: String,
    pub artist_name: String,
    pub played_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayCount {
    /// `YYYY-MM-DD`, utc
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourCount {
    pub hour: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayCount {
    /// 0 is sunday
    pub day: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diversity {
    pub top10_plays: i64,
    pub other_plays: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecadeCount {
    pub decade: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub total_scrobbles: i64,
    pub unique_tracks: i64,
    pub unique_artists: i64,
    pub top_artists: Vec<ArtistPlays>,
    pub top_tracks: Vec<TrackPlays>,
    pub recent_scrobbles: Vec<RecentScrobble>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllTimeStats {
    pub total_scrobbles: i64,
    pub top_artist: Option<ArtistPlays>,
    pub oldest_scrobble: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charts {
    pub listening_by_day: Vec<DayCount>,
    pub listening_by_hour: Vec<HourCount>,
    pub listening_by_day_of_week: Vec<WeekdayCount>,
    pub artist_diversity: Diversity,
    pub listening_by_decade: Vec<DecadeCount>,
}

/// The payload served at `/api/listening-stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningStats {
    pub last30_days: WindowStats,
    pub all_time: AllTimeStats,
    pub charts: Charts,
}

async fn count(store: &dyn Store, sql: &str, params: &[store::Scalar]) -> Result<i64> {
    store::fetch_one(store, sql, params).await?.int("n")
}

async fn top_artists(store: &dyn Store, since: i64) -> Result<Vec<ArtistPlays>> {
    store::fetch_all(
        store,
        "
        select a.name, count(*) as play_count
        from scrobbles s
        join artists a on s.artist_id = a.id
        where s.is_live = 0 and s.played_at >= ?
        group by a.id, a.name
        order by play_count desc, a.id
        limit 10
        ",
        &params![since],
    )
    .await
}

async fn top_tracks(store: &dyn Store, since: i64) -> Result<Vec<TrackPlays>> {
    store::fetch_all(
        store,
        "
        select t.name, a.name as artist_name, count(*) as play_count
        from scrobbles s
        join tracks t on s.track_id = t.id
        join artists a on t.artist_id = a.id
        where s.is_live = 0 and s.played_at >= ?
        group by t.id, t.name, a.name
        order by play_count desc, t.id
        limit 10
        ",
        &params![since],
    )
    .await
}

async fn recent_scrobbles(store: &dyn Store) -> Result<Vec<RecentScrobble>> {
    store::fetch_all(
        store,
        "
        select t.name as track_name, a.name as artist_name, s.played_at
        from scrobbles s
        join tracks t on s.track_id = t.id
        join artists a on s.artist_id = a.id
        order by s.played_at desc, s.id desc
        limit 20
        ",
        &[],
    )
    .await
}

async fn top_artist(store: &dyn Store) -> Result<Option<ArtistPlays>> {
    store::fetch_optional(
        store,
        "
        select a.name, count(*) as play_count
        from scrobbles s
        join artists a on s.artist_id = a.id
        where s.is_live = 0
        group by a.id, a.name
        order by play_count desc, a.id
        limit 1
        ",
        &[],
    )
    .await?
    .map(store::Row::decode)
    .transpose()
}

async fn oldest_scrobble(store: &dyn Store) -> Result<Option<i64>> {
    store::fetch_one(store, "select min(played_at) as oldest from scrobbles where is_live = 0", &[])
        .await?
        .opt_int("oldest")
}

async fn listening_by_day(store: &dyn Store, since: i64) -> Result<Vec<DayCount>> {
    store::fetch_all(
        store,
        "
        select date(played_at, 'unixepoch') as date, count(*) as count
        from scrobbles
        where is_live = 0 and played_at >= ?
        group by date
        order by date asc
        ",
        &params![since],
    )
    .await
}

async fn listening_by_hour(store: &dyn Store) -> Result<Vec<HourCount>> {
    store::fetch_all(
        store,
        "
        select cast(strftime('%H', played_at, 'unixepoch') as integer) as hour, count(*) as count
        from scrobbles
        where is_live = 0
        group by hour
        order by hour asc
        ",
        &[],
    )
    .await
}

async fn listening_by_day_of_week(store: &dyn Store) -> Result<Vec<WeekdayCount>> {
    store::fetch_all(
        store,
        "
        select cast(strftime('%w', played_at, 'unixepoch') as integer) as day, count(*) as count
        from scrobbles
        where is_live = 0
        group by day
        order by day asc
        ",
        &[],
    )
    .await
}

async fn artist_diversity(store: &dyn Store) -> Result<Diversity> {
    let row = store::fetch_one(
        store,
        "
        select
            coalesce(sum(case when rn <= 10 then play_count else 0 end), 0) as top10_plays,
            coalesce(sum(case when rn > 10 then play_count else 0 end), 0) as other_plays
        from (
            select count(*) as play_count,
                row_number() over (order by count(*) desc, artist_id) as rn
            from scrobbles
            where is_live = 0
            group by artist_id
        )
        ",
        &[],
    )
    .await?;
    Ok(Diversity {
        top10_plays: row.int("top10_plays")?,
        other_plays: row.int("other_plays")?,
    })
}

/// Plays bucketed by the decade they happened in. Empty buckets are
/// omitted.
async fn listening_by_decade(store: &dyn Store) -> Result<Vec<DecadeCount>> {
    store::fetch_all(
        store,
        "
        select decade, count from (
            select
                case
                    when strftime('%Y', played_at, 'unixepoch') >= '2020' then '2020s'
                    when strftime('%Y', played_at, 'unixepoch') >= '2010' then '2010s'
                    when strftime('%Y', played_at, 'unixepoch') >= '2000' then '2000s'
                    when strftime('%Y', played_at, 'unixepoch') >= '1990' then '1990s'
                    when strftime('%Y', played_at, 'unixepoch') >= '1980' then '1980s'
                    when strftime('%Y', played_at, 'unixepoch') >= '1970' then '1970s'
                    else 'Pre-1970s'
                end as decade,
                count(*) as count,
                min(played_at) as first_played
            from scrobbles
            where is_live = 0
            group by decade
        )
        order by first_played asc
        ",
        &[],
    )
    .await
}

/// Compute the full payload as of `now` (unix seconds)
pub async fn listening_stats(
    store: &dyn Store,
    now: i64,
    window: StatsWindow,
) -> Result<ListeningStats> {
    let since = now - i64::from(window.days) * DAY_SECONDS;
    let daily_since = now - i64::from(window.daily_days) * DAY_SECONDS;
    let window_params = params![since];

    let (
        total,
        unique_tracks,
        unique_artists,
        top_artists,
        top_tracks,
        recent_scrobbles,
        all_time_total,
        top_artist,
        oldest_scrobble,
        by_day,
        by_hour,
        by_day_of_week,
        diversity,
        by_decade,
    ) = futures::try_join!(
        count(
            store,
            "select count(*) as n from scrobbles where is_live = 0 and played_at >= ?",
            &window_params
        ),
        count(
            store,
            "select count(distinct track_id) as n from scrobbles where is_live = 0 and played_at >= ?",
            &window_params
        ),
        count(
            store,
            "select count(distinct artist_id) as n from scrobbles where is_live = 0 and played_at >= ?",
            &window_params
        ),
        top_artists(store, since),
        top_tracks(store, since),
        recent_scrobbles(store),
        count(
            store,
            "select count(*) as n from scrobbles where is_live = 0",
            &[]
        ),
        top_artist(store),
        oldest_scrobble(store),
        listening_by_day(store, daily_since),
        listening_by_hour(store),
        listening_by_day_of_week(store),
        artist_diversity(store),
        listening_by_decade(store),
    )?;

    Ok(ListeningStats {
        last30_days: WindowStats {
            total_scrobbles: total,
            unique_tracks,
            unique_artists,
            top_artists,
            top_tracks,
            recent_scrobbles,
        },
        all_time: AllTimeStats {
            total_scrobbles: all_time_total,
            top_artist,
            oldest_scrobble,
        },
        charts: Charts {
            listening_by_day: by_day,
            listening_by_hour: by_hour,
            listening_by_day_of_week: by_day_of_week,
            artist_diversity: diversity,
            listening_by_decade: by_decade,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::models::NewScrobble;
    use crate::store::{temp_store, SqliteStore};

    async fn play(store: &SqliteStore, artist: &str, track: &str, played_at: i64) {
        record(store, artist, track, played_at, false).await
    }

    async fn record(store: &SqliteStore, artist: &str, track: &str, played_at: i64, is_live: bool) {
        let artist_id = catalog::find_or_create_artist(store, artist, None)
            .await
            .unwrap();
        let track_id = catalog::find_or_create_track(store, artist_id, track, None, None)
            .await
            .unwrap();
        catalog::insert_scrobble(
            store,
            &NewScrobble {
                track_id,
                artist_id,
                played_at,
                source_timestamp: None,
                is_live,
            },
        )
        .await
        .unwrap();
    }

    // tuesday 2023-11-14 22:13:20 utc
    const NOW: i64 = 1_700_000_000;

    #[async_std::test]
    async fn empty_store() {
        let (_dir, store) = temp_store().await;
        let stats = listening_stats(&store, NOW, StatsWindow::default())
            .await
            .unwrap();
        assert_eq!(stats.last30_days.total_scrobbles, 0);
        assert!(stats.last30_days.top_artists.is_empty());
        assert_eq!(stats.all_time.total_scrobbles, 0);
        assert_eq!(stats.all_time.top_artist, None);
        assert_eq!(stats.all_time.oldest_scrobble, None);
        assert_eq!(stats.charts.artist_diversity, Diversity::default());
        assert!(stats.charts.listening_by_decade.is_empty());
    }

    #[async_std::test]
    async fn window_and_all_time_groups() {
        let (_dir, store) = temp_store().await;
        play(&store, "Air", "Talisman", NOW - 60).await;
        play(&store, "Air", "Talisman", NOW - 120).await;
        play(&store, "Air", "Sexy Boy", NOW - 180).await;
        play(&store, "Moby", "Porcelain", NOW - 240).await;
        // outside the 30 day window
        play(&store, "Moby", "Porcelain", NOW - 40 * DAY_SECONDS).await;
        play(&store, "Moby", "Natural Blues", NOW - 41 * DAY_SECONDS).await;
        play(&store, "Moby", "Honey", NOW - 42 * DAY_SECONDS).await;

        let stats = listening_stats(&store, NOW, StatsWindow::default())
            .await
            .unwrap();
        let window = &stats.last30_days;
        assert_eq!(window.total_scrobbles, 4);
        assert_eq!(window.unique_tracks, 3);
        assert_eq!(window.unique_artists, 2);
        assert_eq!(
            window.top_artists[0],
            ArtistPlays {
                name: "Air".to_string(),
                play_count: 3
            }
        );
        assert_eq!(
            window.top_tracks[0],
            TrackPlays {
                name: "Talisman".to_string(),
                artist_name: "Air".to_string(),
                play_count: 2
            }
        );
        assert_eq!(window.recent_scrobbles.len(), 7);
        assert_eq!(window.recent_scrobbles[0].played_at, NOW - 60);
        assert_eq!(window.recent_scrobbles[6].track_name, "Honey");

        assert_eq!(stats.all_time.total_scrobbles, 7);
        assert_eq!(
            stats.all_time.top_artist,
            Some(ArtistPlays {
                name: "Moby".to_string(),
                play_count: 4
            })
        );
        assert_eq!(stats.all_time.oldest_scrobble, Some(NOW - 42 * DAY_SECONDS));

        // a wider window picks up the older plays
        let wide = listening_stats(
            &store,
            NOW,
            StatsWindow {
                days: 60,
                daily_days: 90,
            },
        )
        .await
        .unwrap();
        assert_eq!(wide.last30_days.total_scrobbles, 7);

        let days = &stats.charts.listening_by_day;
        assert_eq!(days.len(), 4);
        assert!(days.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(days.last().unwrap().date, "2023-11-14");
        assert_eq!(days.last().unwrap().count, 4);
    }

    #[async_std::test]
    async fn diversity_split_covers_every_play() {
        let (_dir, store) = temp_store().await;
        let mut total = 0;
        for i in 1..=13i64 {
            for j in 0..i {
                play(&store, &format!("Artist {}", i), "Song", NOW - i * 1000 - j).await;
                total += 1;
            }
        }
        let stats = listening_stats(&store, NOW, StatsWindow::default())
            .await
            .unwrap();
        let diversity = &stats.charts.artist_diversity;
        assert_eq!(diversity.top10_plays + diversity.other_plays, total);
        assert_eq!(diversity.other_plays, 1 + 2 + 3);
        assert_eq!(stats.last30_days.top_artists.len(), 10);
        assert_eq!(stats.last30_days.top_artists[0].name, "Artist 13");
    }

    #[async_std::test]
    async fn time_histograms() {
        let (_dir, store) = temp_store().await;
        // sunday 2006-01-01 00:00 utc
        play(&store, "Boards of Canada", "Roygbiv", 1_136_073_600).await;
        play(&store, "Air", "Talisman", NOW).await;
        play(&store, "Air", "Talisman", NOW - 3600).await;
        // sunday 1978-01-01 00:00 utc
        play(&store, "Kraftwerk", "Neon Lights", 252_460_800).await;

        let stats = listening_stats(&store, NOW, StatsWindow::default())
            .await
            .unwrap();
        let hours = &stats.charts.listening_by_hour;
        assert_eq!(
            hours,
            &vec![
                HourCount { hour: 0, count: 2 },
                HourCount { hour: 21, count: 1 },
                HourCount { hour: 22, count: 1 },
            ]
        );
        assert_eq!(
            stats.charts.listening_by_day_of_week,
            vec![
                WeekdayCount { day: 0, count: 2 },
                WeekdayCount { day: 2, count: 2 },
            ]
        );
        let decades: Vec<_> = stats
            .charts
            .listening_by_decade
            .iter()
            .map(|d| (d.decade.as_str(), d.count))
            .collect();
        assert_eq!(decades, vec![("1970s", 1), ("2000s", 1), ("2020s", 2)]);
    }

    #[async_std::test]
    async fn now_playing_is_recent_but_not_counted() {
        let (_dir, store) = temp_store().await;
        play(&store, "Boards of Canada", "Roygbiv", NOW - 600).await;
        record(&store, "Air", "Alone in Kyoto", NOW, true).await;

        let stats = listening_stats(&store, NOW, StatsWindow::default())
            .await
            .unwrap();
        assert_eq!(stats.last30_days.total_scrobbles, 1);
        assert_eq!(stats.last30_days.unique_tracks, 1);
        assert_eq!(stats.last30_days.unique_artists, 1);
        assert_eq!(stats.last30_days.top_tracks.len(), 1);
        assert_eq!(stats.last30_days.top_tracks[0].name, "Roygbiv");
        assert_eq!(stats.last30_days.top_artists.len(), 1);
        assert_eq!(stats.all_time.total_scrobbles, 1);
        assert_eq!(
            stats.all_time.top_artist.map(|a| a.name).as_deref(),
            Some("Boards of Canada")
        );
        assert_eq!(stats.charts.listening_by_day.iter().map(|d| d.count).sum::<i64>(), 1);
        assert_eq!(stats.charts.listening_by_hour.iter().map(|h| h.count).sum::<i64>(), 1);
        assert_eq!(stats.charts.artist_diversity.top10_plays, 1);

        let recent = &stats.last30_days.recent_scrobbles;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].track_name, "Alone in Kyoto");
    }

    #[test]
    fn payload_shape() {
        let stats = ListeningStats {
            last30_days: WindowStats {
                total_scrobbles: 1,
                unique_tracks: 1,
                unique_artists: 1,
                top_artists: vec![],
                top_tracks: vec![],
                recent_scrobbles: vec![],
            },
            all_time: AllTimeStats {
                total_scrobbles: 1,
                top_artist: None,
                oldest_scrobble: Some(5),
            },
            charts: Charts {
                listening_by_day: vec![],
                listening_by_hour: vec![],
                listening_by_day_of_week: vec![],
                artist_diversity: Diversity {
                    top10_plays: 1,
                    other_plays: 0,
                },
                listening_by_decade: vec![],
            },
        };
        let v = serde_json::to_value(&stats).unwrap();
        assert_eq!(v["last30Days"]["totalScrobbles"], 1);
        assert_eq!(v["allTime"]["topArtist"], serde_json::Value::Null);
        assert_eq!(v["allTime"]["oldestScrobble"], 5);
        assert_eq!(v["charts"]["artistDiversity"]["top10_plays"], 1);
        assert!(v["charts"]["listeningByDayOfWeek"].is_array());
    }
}
