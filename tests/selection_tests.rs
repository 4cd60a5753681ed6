use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;

use storm_sync::api::mock::{album_json, playlist_item, track_json, MockCatalog, WriteCall};
use storm_sync::config::SyncConfig;
use storm_sync::jobs::SyncContext;
use storm_sync::models::{DateWindow, StormConfig};
use storm_sync::observer::{RecordingObserver, SyncEvent};
use storm_sync::selection::{ArtistTrackBuilder, TrackSelectionBuilder};
use storm_sync::store::CatalogStore;
use storm_sync::storm::{harvest_job, run_storm, StormRunOptions};

fn album_tracks(prefix: &str, n: usize, artists: &[(&str, &str)]) -> Vec<Value> {
    let artists: Vec<Value> = artists.iter().map(|(id, name)| json!({"id": id, "name": name})).collect();
    (0..n)
        .map(|i| json!({"id": format!("{}{}", prefix, i), "name": format!("{} {}", prefix, i), "artists": artists}))
        .collect()
}

/// P1 references A1 and A2; the blacklist playlist references A2 and A9.
/// A1 has an old and a recent album, A2 one recent album.
fn catalog() -> MockCatalog {
    MockCatalog::new()
        .with_playlist(
            "P1",
            "Input",
            vec![
                playlist_item(track_json("T1", "one", &[("A1", "Artist One")], "X")),
                playlist_item(track_json("T2", "two", &[("A2", "Artist Two")], "X")),
            ],
        )
        .with_playlist(
            "BL",
            "Nope",
            vec![
                playlist_item(track_json("T3", "three", &[("A2", "Artist Two")], "X")),
                playlist_item(track_json("T4", "four", &[("A9", "Artist Nine")], "X")),
            ],
        )
        .with_artist_albums(
            "A1",
            vec![
                album_json("AL0", "Early", "A1", "2015-01-01"),
                album_json("AL1", "Recent", "A1", "2021-05-01"),
            ],
        )
        .with_artist_albums("A2", vec![album_json("AL2", "Other", "A2", "2021-06-01")])
        .with_album_tracks("AL0", album_tracks("old", 2, &[("A1", "Artist One")]))
        .with_album_tracks("AL1", album_tracks("new", 5, &[("A1", "Artist One")]))
        .with_album_tracks("AL2", album_tracks("bl", 3, &[("A2", "Artist Two")]))
}

fn weekly() -> StormConfig {
    let mut config = StormConfig::new("weekly", vec!["P1".into()]);
    config.artist_blacklist_playlist = Some("BL".into());
    config.target_playlist = Some("OUT".into());
    config
}

fn window_2020s() -> DateWindow {
    DateWindow::new(NaiveDate::from_ymd_opt(2020, 1, 1), NaiveDate::from_ymd_opt(2022, 12, 31))
}

fn context(source: &Arc<MockCatalog>, store: &CatalogStore) -> SyncContext {
    SyncContext::new(source.clone(), store.clone())
}

fn uris(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("spotify:track:{}{}", prefix, i)).collect()
}

#[tokio::test]
async fn storm_run_writes_the_selection_back() {
    let store = CatalogStore::in_memory();
    store.create_config(&weekly()).unwrap();
    let source = Arc::new(catalog());
    let observer = Arc::new(RecordingObserver::new());
    let ctx = context(&source, &store).with_observer(observer.clone());

    let options = StormRunOptions {
        window: window_2020s(),
        dry_run: false,
    };
    let report = run_storm(&ctx, "weekly", &options).await.unwrap();

    assert!(report.harvest.is_success());
    assert_eq!(report.selection.artist_ids, vec!["A1".to_string()]);
    assert_eq!(report.selection.blacklisted, vec!["A2".to_string()]);
    assert_eq!(report.selection.track_ids().len(), 5);
    assert_eq!(report.written_to.as_deref(), Some("OUT"));
    assert_eq!(report.write_calls, 1);

    assert_eq!(
        source.writes(),
        vec![WriteCall::Replace {
            playlist_id: "OUT".into(),
            uris: uris("new", 0..5),
        }]
    );
    assert_eq!(
        observer.count(|e| matches!(e, SyncEvent::TracksWritten { tracks: 5, calls: 1, .. })),
        1
    );

    // blacklist-only artists are never harvested
    assert!(store.get_artist("A9").unwrap().is_none());
    assert_eq!(store.list_blacklisted("weekly").unwrap().len(), 2);
}

#[tokio::test]
async fn storm_run_batches_writes() {
    let store = CatalogStore::in_memory();
    store.create_config(&weekly()).unwrap();
    let source = Arc::new(catalog());
    let settings = SyncConfig {
        write_batch_size: 2,
        ..SyncConfig::default()
    };
    let ctx = context(&source, &store).with_settings(settings);

    let options = StormRunOptions {
        window: window_2020s(),
        dry_run: false,
    };
    let report = run_storm(&ctx, "weekly", &options).await.unwrap();
    assert_eq!(report.write_calls, 3);
    assert_eq!(
        source.writes(),
        vec![
            WriteCall::Replace {
                playlist_id: "OUT".into(),
                uris: uris("new", 0..2)
            },
            WriteCall::Append {
                playlist_id: "OUT".into(),
                uris: uris("new", 2..4)
            },
            WriteCall::Append {
                playlist_id: "OUT".into(),
                uris: uris("new", 4..5)
            },
        ]
    );
    assert_eq!(source.playlist_contents("OUT"), uris("new", 0..5));
}

#[tokio::test]
async fn dry_run_selects_without_writing() {
    let store = CatalogStore::in_memory();
    store.create_config(&weekly()).unwrap();
    let source = Arc::new(catalog());
    let ctx = context(&source, &store);

    let options = StormRunOptions {
        window: DateWindow::unbounded(),
        dry_run: true,
    };
    let report = run_storm(&ctx, "weekly", &options).await.unwrap();
    assert_eq!(report.selection.tracks.len(), 7);
    assert!(report.written_to.is_none());
    assert!(source.writes().is_empty());
}

#[tokio::test]
async fn empty_selection_clears_the_target() {
    let store = CatalogStore::in_memory();
    store.create_config(&weekly()).unwrap();
    let source = Arc::new(catalog());
    let ctx = context(&source, &store);

    let options = StormRunOptions {
        window: DateWindow::new(NaiveDate::from_ymd_opt(1990, 1, 1), NaiveDate::from_ymd_opt(1990, 12, 31)),
        dry_run: false,
    };
    let report = run_storm(&ctx, "weekly", &options).await.unwrap();
    assert!(report.selection.is_empty());
    assert_eq!(report.write_calls, 1);
    assert_eq!(
        source.writes(),
        vec![WriteCall::Replace {
            playlist_id: "OUT".into(),
            uris: vec![]
        }]
    );
}

#[tokio::test]
async fn storm_without_target_is_not_written() {
    let store = CatalogStore::in_memory();
    let mut config = weekly();
    config.target_playlist = None;
    store.create_config(&config).unwrap();
    let source = Arc::new(catalog());
    let ctx = context(&source, &store);

    let report = run_storm(&ctx, "weekly", &StormRunOptions::default()).await.unwrap();
    assert!(!report.selection.is_empty());
    assert!(report.written_to.is_none());
    assert!(source.writes().is_empty());
}

#[tokio::test]
async fn unknown_storm_is_an_error() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(catalog());
    let ctx = context(&source, &store);
    let err = run_storm(&ctx, "nope", &StormRunOptions::default()).await.unwrap_err();
    assert!(err.to_string().contains("nope"));
    assert!(source.calls().is_empty());
}

#[test]
fn harvest_job_runs_blacklist_before_album_work() {
    assert_eq!(harvest_job(&weekly()).len(), 5);
    assert_eq!(harvest_job(&StormConfig::new("plain", vec!["P1".into()])).len(), 4);
}

#[tokio::test]
async fn selection_deduplicates_shared_tracks() {
    let store = CatalogStore::in_memory();
    let split = json!({
        "id": "SPLIT",
        "name": "Split",
        "artists": [{"id": "A1"}, {"id": "A3"}],
        "release_date": "2021-01-01"
    });
    let source = Arc::new(
        MockCatalog::new()
            .with_playlist(
                "P1",
                "Input",
                vec![
                    playlist_item(track_json("T1", "one", &[("A1", "Artist One")], "X")),
                    playlist_item(track_json("T2", "two", &[("A3", "Artist Three")], "X")),
                ],
            )
            .with_artist_albums("A1", vec![split.clone()])
            .with_artist_albums("A3", vec![split])
            .with_album_tracks("SPLIT", album_tracks("duet", 2, &[("A1", "Artist One"), ("A3", "Artist Three")])),
    );
    store.create_config(&StormConfig::new("duets", vec!["P1".into()])).unwrap();
    let ctx = context(&source, &store);
    harvest_job(&store.get_config("duets").unwrap().unwrap()).run(&ctx).await;

    let by_artist = ArtistTrackBuilder::new(&store)
        .tracks(&["A1".to_string(), "A3".to_string()], &DateWindow::unbounded())
        .unwrap();
    assert_eq!(by_artist.len(), 2);

    let selection = TrackSelectionBuilder::new(&store, "duets")
        .playlists(vec!["P1".to_string()])
        .window(window_2020s())
        .build()
        .unwrap();
    assert_eq!(selection.artist_ids, vec!["A1".to_string(), "A3".to_string()]);
    assert_eq!(selection.track_ids(), vec!["duet0".to_string(), "duet1".to_string()]);
}
