use serde_json::{json, Value};
use std::sync::Arc;

use storm_sync::api::mock::{album_json, playlist_item, track_json, MockCatalog};
use storm_sync::jobs::{
    AlbumTrackCollection, ArtistAlbumDiscovery, ArtistDiscovery, Job, OperationOutcome, PlaylistSync, SyncContext,
};
use storm_sync::observer::{RecordingObserver, SyncEvent};
use storm_sync::store::CatalogStore;

fn album_track(id: &str, artist: (&str, &str)) -> Value {
    json!({"id": id, "name": format!("Song {}", id), "artists": [{"id": artist.0, "name": artist.1}]})
}

/// Playlist P1 holds one track by A1 and one by A2. A1 has a single album
/// with three tracks; A2's only album comes back empty.
fn weekly_catalog() -> MockCatalog {
    MockCatalog::new()
        .with_playlist(
            "P1",
            "Weekly",
            vec![
                playlist_item(track_json("T1", "First", &[("A1", "Artist One")], "X1")),
                playlist_item(track_json("T2", "Second", &[("A2", "Artist Two")], "X2")),
            ],
        )
        .with_artist_albums("A1", vec![album_json("AL1", "Debut", "A1", "2021-05-01")])
        .with_artist_albums("A2", vec![album_json("AL2", "Silence", "A2", "2019-01-01")])
        .with_album_tracks(
            "AL1",
            vec![
                album_track("t10", ("A1", "Artist One")),
                album_track("t11", ("A1", "Artist One")),
                album_track("t12", ("A1", "Artist One")),
            ],
        )
}

fn harvest() -> Job {
    Job::new("harvest")
        .then(PlaylistSync::new(vec!["P1".into()]))
        .then(ArtistDiscovery::new(vec!["P1".into()]))
        .then(ArtistAlbumDiscovery::new())
        .then(AlbumTrackCollection::new())
}

fn context(source: &Arc<MockCatalog>, store: &CatalogStore) -> (SyncContext, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    let ctx = SyncContext::new(source.clone(), store.clone()).with_observer(observer.clone());
    (ctx, observer)
}

#[tokio::test]
async fn full_harvest_populates_the_store() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(weekly_catalog());
    let (ctx, observer) = context(&source, &store);

    let report = harvest().run(&ctx).await;
    assert!(report.is_success());
    assert_eq!(report.resource_failures(), 0);

    let playlist = store.get_playlist("P1").unwrap().unwrap();
    assert_eq!(playlist.name, "Weekly");
    assert_eq!(store.playlist_tracks("P1", false).unwrap().len(), 2);

    let a1 = store.get_artist("A1").unwrap().unwrap();
    let a2 = store.get_artist("A2").unwrap().unwrap();
    assert!(a1.last_album_update.is_some());
    assert!(a2.last_album_update.is_some());

    let al1 = store.get_album("AL1").unwrap().unwrap();
    assert!(al1.tracks_collected_date.is_some());
    assert_eq!(al1.track_collection_fail_count, 0);
    let collected = store.tracks_for_album("AL1").unwrap();
    assert_eq!(collected.len(), 3);
    assert!(collected.iter().all(|t| t.album.id == "AL1"));

    // an empty listing counts as a failure and leaves the watermark alone
    let al2 = store.get_album("AL2").unwrap().unwrap();
    assert!(al2.tracks_collected_date.is_none());
    assert_eq!(al2.track_collection_fail_count, 1);

    // the playlist listing was paged (page size 2, two items)
    assert!(source.calls().contains(&"playlist_tracks:P1@0".to_string()));
    assert_eq!(observer.count(|e| matches!(e, SyncEvent::ArtistDiscovered { .. })), 2);
    assert_eq!(observer.count(|e| matches!(e, SyncEvent::AlbumDiscovered { .. })), 2);
    assert_eq!(
        observer.count(|e| matches!(e, SyncEvent::AlbumTracksCollected { album_id, tracks: 3 } if album_id == "AL1")),
        1
    );
    assert_eq!(
        observer.count(|e| matches!(
            e,
            SyncEvent::AlbumCollectionFailed { album_id, fail_count: Some(1), reason: None } if album_id == "AL2"
        )),
        1
    );
}

#[tokio::test]
async fn collection_pages_through_long_album_listings() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(weekly_catalog());
    let (ctx, _) = context(&source, &store);
    harvest().run(&ctx).await;

    let calls = source.calls();
    assert!(calls.contains(&"album_tracks:AL1@0".to_string()));
    assert!(calls.contains(&"album_tracks:AL1@2".to_string()));
    assert!(!calls.contains(&"album_tracks:AL1@4".to_string()));
}

#[tokio::test]
async fn second_run_only_touches_work_still_due() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(weekly_catalog());
    let (ctx, _) = context(&source, &store);

    harvest().run(&ctx).await;
    let tracks_before = store.tracks_for_artist("A1").unwrap();
    let first_calls = source.calls().len();

    let report = harvest().run(&ctx).await;
    let new_calls: Vec<String> = source.calls().into_iter().skip(first_calls).collect();

    // artists are checked already and AL1 is collected; only AL2 is retried
    assert!(!new_calls.iter().any(|c| c.starts_with("artist_albums:")));
    assert!(!new_calls.iter().any(|c| c.starts_with("album_tracks:AL1")));
    assert!(new_calls.contains(&"album_tracks:AL2@0".to_string()));
    let discovery = report.outcome("artist_album_discovery").and_then(OperationOutcome::report).unwrap();
    assert_eq!(discovery.processed, 0);

    let ids = |tracks: Vec<storm_sync::models::Track>| tracks.into_iter().map(|t| t.id).collect::<Vec<_>>();
    assert_eq!(ids(store.tracks_for_artist("A1").unwrap()), ids(tracks_before));
    assert_eq!(store.get_album("AL2").unwrap().unwrap().track_collection_fail_count, 2);
}

#[tokio::test]
async fn albums_at_the_fail_cap_are_skipped() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(weekly_catalog());
    let (ctx, _) = context(&source, &store);
    harvest().run(&ctx).await;

    let collect = Job::new("collect").then(AlbumTrackCollection::new());
    collect.run(&ctx).await;
    collect.run(&ctx).await;
    assert_eq!(store.get_album("AL2").unwrap().unwrap().track_collection_fail_count, 3);

    let report = collect.run(&ctx).await;
    let collection = report.outcome("album_track_collection").and_then(OperationOutcome::report).unwrap();
    assert_eq!(collection.processed, 0);
    assert_eq!(store.get_album("AL2").unwrap().unwrap().track_collection_fail_count, 3);
}

#[tokio::test]
async fn album_fetch_error_takes_the_failure_path() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(weekly_catalog().fail_on("AL1"));
    let (ctx, observer) = context(&source, &store);

    let report = harvest().run(&ctx).await;
    assert!(report.is_success());

    let al1 = store.get_album("AL1").unwrap().unwrap();
    assert!(al1.tracks_collected_date.is_none());
    assert_eq!(al1.track_collection_fail_count, 1);
    assert!(store.tracks_for_album("AL1").unwrap().is_empty());
    assert_eq!(
        observer.count(|e| matches!(
            e,
            SyncEvent::AlbumCollectionFailed { album_id, reason: Some(_), .. } if album_id == "AL1"
        )),
        1
    );
}

#[tokio::test]
async fn album_with_only_invalid_tracks_stays_due() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(weekly_catalog().with_album_tracks(
        "AL1",
        vec![
            json!({"id": "t1", "name": "no artists"}),
            json!({"name": "no id", "artists": [{"id": "A1", "name": "Artist One"}]}),
        ],
    ));
    let (ctx, observer) = context(&source, &store);

    let report = harvest().run(&ctx).await;
    let collection = report.outcome("album_track_collection").and_then(OperationOutcome::report).unwrap();
    assert_eq!(collection.rejected, 2);

    let al1 = store.get_album("AL1").unwrap().unwrap();
    assert!(al1.tracks_collected_date.is_none());
    assert_eq!(al1.track_collection_fail_count, 1);
    assert!(store.tracks_for_album("AL1").unwrap().is_empty());
    assert_eq!(
        observer.count(|e| matches!(
            e,
            SyncEvent::AlbumCollectionFailed { album_id, reason: Some(_), .. } if album_id == "AL1"
        )),
        1
    );
    assert_eq!(
        observer.count(|e| matches!(e, SyncEvent::AlbumTracksCollected { album_id, .. } if album_id == "AL1")),
        0
    );

    let first_calls = source.calls().len();
    Job::new("collect").then(AlbumTrackCollection::new()).run(&ctx).await;
    let new_calls: Vec<String> = source.calls().into_iter().skip(first_calls).collect();
    assert!(new_calls.contains(&"album_tracks:AL1@0".to_string()));
    assert_eq!(store.get_album("AL1").unwrap().unwrap().track_collection_fail_count, 2);
}

#[tokio::test]
async fn artist_fetch_error_keeps_the_artist_due() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(weekly_catalog().fail_on("A1"));
    let (ctx, observer) = context(&source, &store);

    let report = harvest().run(&ctx).await;
    let discovery = report.outcome("artist_album_discovery").and_then(OperationOutcome::report).unwrap();
    assert_eq!(discovery.processed, 2);
    assert_eq!(discovery.failures.len(), 1);
    assert_eq!(discovery.failures[0].resource_id, "A1");

    assert!(store.get_artist("A1").unwrap().unwrap().last_album_update.is_none());
    assert!(store.get_artist("A2").unwrap().unwrap().last_album_update.is_some());
    assert!(store.get_album("AL1").unwrap().is_none());
    assert_eq!(
        observer.count(|e| matches!(e, SyncEvent::ResourceFailed { resource_id, .. } if resource_id == "A1")),
        1
    );
}

#[tokio::test]
async fn removed_playlist_entries_are_soft_deleted() {
    let store = CatalogStore::in_memory();
    let a = playlist_item(track_json("A", "a", &[("A1", "Artist One")], "X1"));
    let b = playlist_item(track_json("B", "b", &[("A1", "Artist One")], "X1"));
    let c = playlist_item(track_json("C", "c", &[("A2", "Artist Two")], "X2"));
    let sync = Job::new("sync").then(PlaylistSync::new(vec!["P1".into()]));

    let before = Arc::new(MockCatalog::new().with_playlist("P1", "Mix", vec![a.clone(), b, c.clone()]));
    let (ctx, _) = context(&before, &store);
    sync.run(&ctx).await;
    assert_eq!(store.playlist_tracks("P1", false).unwrap().len(), 3);

    let after = Arc::new(MockCatalog::new().with_playlist("P1", "Mix", vec![a, c]));
    let (ctx, observer) = context(&after, &store);
    sync.run(&ctx).await;

    let active: Vec<String> = store
        .playlist_tracks("P1", false)
        .unwrap()
        .into_iter()
        .map(|e| e.track_id)
        .collect();
    assert_eq!(active, vec!["A".to_string(), "C".to_string()]);
    let removed = store.playlist_tracks("P1", true).unwrap().into_iter().find(|e| e.track_id == "B").unwrap();
    assert!(removed.sys_is_deleted);
    assert_eq!(
        observer.count(|e| matches!(e, SyncEvent::PlaylistSynced { soft_deleted: 1, upserted: 2, .. })),
        1
    );
}

#[tokio::test]
async fn one_broken_playlist_does_not_stop_the_others() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(weekly_catalog());
    let (ctx, _) = context(&source, &store);

    let report = Job::new("sync")
        .then(PlaylistSync::new(vec!["missing".into(), "P1".into()]))
        .then(ArtistDiscovery::new(vec!["P1".into()]))
        .run(&ctx)
        .await;

    let sync = report.outcome("playlist_sync").and_then(OperationOutcome::report).unwrap();
    assert_eq!(sync.processed, 2);
    assert_eq!(sync.failures.len(), 1);
    assert_eq!(sync.failures[0].resource_id, "missing");
    assert_eq!(sync.succeeded(), 1);
    assert!(store.get_playlist("P1").unwrap().is_some());
    assert!(store.get_artist("A1").unwrap().is_some());
}

#[tokio::test]
async fn invalid_items_are_counted_as_rejected() {
    let store = CatalogStore::in_memory();
    let source = Arc::new(MockCatalog::new().with_playlist(
        "P1",
        "Mixed",
        vec![
            playlist_item(track_json("T1", "ok", &[("A1", "Artist One")], "X1")),
            playlist_item(json!({"id": "T2", "name": "no artists", "artists": [], "album": {"id": "X"}})),
        ],
    ));
    let (ctx, observer) = context(&source, &store);

    let report = Job::new("sync").then(PlaylistSync::new(vec!["P1".into()])).run(&ctx).await;
    let sync = report.outcome("playlist_sync").and_then(OperationOutcome::report).unwrap();
    assert_eq!(sync.rejected, 1);
    assert!(sync.failures.is_empty());
    assert_eq!(
        observer.count(|e| matches!(e, SyncEvent::ItemRejected { resource_id, .. } if resource_id == "T2")),
        1
    );
    assert!(store.get_track("T2").unwrap().is_none());
}
