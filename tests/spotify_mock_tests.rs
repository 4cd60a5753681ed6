use mockito::{Matcher, Server};
use serde_json::json;
use storm_sync as lib;
use lib::api::spotify::SpotifyCatalog;
use lib::api::{fetch_playlist_tracks, write_tracks_to_playlist, CatalogSource};
use lib::config::SpotifySettings;

fn settings(base: &str) -> SpotifySettings {
    SpotifySettings {
        client_id: "cid".into(),
        client_secret: "csecret".into(),
        api_base: base.into(),
        auth_base: base.into(),
        ..SpotifySettings::default()
    }
}

fn token_mock(server: &mut Server, token: &str) -> mockito::Mock {
    server
        .mock("POST", "/api/token")
        .match_header("authorization", "Basic Y2lkOmNzZWNyZXQ=")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": token, "token_type": "Bearer", "expires_in": 3600}).to_string())
        .expect(1)
        .create()
}

fn track_item(id: &str) -> serde_json::Value {
    json!({
        "added_at": "2024-01-01T00:00:00Z",
        "is_local": false,
        "track": {"id": id, "name": id, "artists": [{"id": "a1", "name": "A"}], "album": {"id": "al1"}}
    })
}

#[test]
fn playlist_tracks_follow_next_urls() {
    let mut server = Server::new();
    let base = server.url();
    let _token = token_mock(&mut server, "tok");

    let first = server
        .mock("GET", "/playlists/P1/tracks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "100".into()),
            Matcher::UrlEncoded("market".into(), "US".into()),
        ]))
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [track_item("t1"), track_item("t2")],
                "next": format!("{}/playlists/P1/tracks?offset=100", base)
            })
            .to_string(),
        )
        .create();
    let second = server
        .mock("GET", "/playlists/P1/tracks")
        .match_query(Matcher::UrlEncoded("offset".into(), "100".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [track_item("t3"), null], "next": null}).to_string())
        .create();

    let catalog = SpotifyCatalog::new(settings(&base)).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let items = rt.block_on(fetch_playlist_tracks(&catalog, "P1")).unwrap();

    let ids: Vec<&str> = items.iter().filter_map(|i| i["track"]["id"].as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2", "t3"]);
    first.assert();
    second.assert();
}

#[test]
fn unauthorized_response_refreshes_the_token_once() {
    let mut server = Server::new();
    let base = server.url();
    let stale = token_mock(&mut server, "stale");
    let fresh = token_mock(&mut server, "fresh");

    let rejected = server
        .mock("GET", "/playlists/P1")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer stale")
        .with_status(401)
        .with_body(r#"{"error":{"status":401,"message":"The access token expired"}}"#)
        .expect(1)
        .create();
    let accepted = server
        .mock("GET", "/playlists/P1")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": "P1", "name": "Weekly"}).to_string())
        .expect(1)
        .create();

    let catalog = SpotifyCatalog::new(settings(&base)).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let meta = rt.block_on(catalog.fetch_playlist_metadata("P1")).unwrap();
    assert_eq!(meta["name"], "Weekly");

    stale.assert();
    fresh.assert();
    rejected.assert();
    accepted.assert();
}

#[test]
fn rate_limited_call_is_retried_after_the_advertised_delay() {
    let mut server = Server::new();
    let base = server.url();
    let _token = token_mock(&mut server, "tok");

    let limited = server
        .mock("GET", "/albums/AL1/tracks")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(1)
        .create();
    let ok = server
        .mock("GET", "/albums/AL1/tracks")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [{"id": "t1", "name": "one"}], "next": null}).to_string())
        .expect(1)
        .create();

    let catalog = SpotifyCatalog::new(settings(&base)).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let page = rt.block_on(catalog.fetch_album_tracks_page("AL1", None)).unwrap();
    assert_eq!(page.items.len(), 1);
    assert!(page.next.is_none());
    limited.assert();
    ok.assert();
}

#[test]
fn persistent_rate_limit_returns_rate_limited_error() {
    let mut server = Server::new();
    let base = server.url();
    let _token = token_mock(&mut server, "tok");

    let limited = server
        .mock("POST", "/playlists/OUT/tracks")
        .with_status(429)
        .with_header("retry-after", "0")
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"rate_limited"}"#)
        .expect(2)
        .create();

    let mut cfg = settings(&base);
    cfg.max_rate_limit_retries = 1;
    let catalog = SpotifyCatalog::new(cfg).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let res = rt.block_on(catalog.append_playlist_tracks("OUT", &["spotify:track:1".to_string()]));

    let err = format!("{}", res.unwrap_err());
    assert!(err.contains("rate_limited"));
    limited.assert();
}

#[test]
fn write_back_replaces_then_appends() {
    let mut server = Server::new();
    let base = server.url();
    let _token = token_mock(&mut server, "tok");

    let replace = server
        .mock("PUT", "/playlists/OUT/tracks")
        .match_body(Matcher::Json(json!({"uris": ["spotify:track:a", "spotify:track:b"]})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"snapshot_id":"s1"}"#)
        .expect(1)
        .create();
    let append = server
        .mock("POST", "/playlists/OUT/tracks")
        .match_body(Matcher::Json(json!({"uris": ["spotify:track:c"]})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"snapshot_id":"s2"}"#)
        .expect(1)
        .create();

    let catalog = SpotifyCatalog::new(settings(&base)).unwrap();
    let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let rt = tokio::runtime::Runtime::new().unwrap();
    let calls = rt
        .block_on(write_tracks_to_playlist(&catalog, "OUT", &ids, true, 2))
        .unwrap();

    assert_eq!(calls, 2);
    replace.assert();
    append.assert();
}

#[test]
fn refresh_token_grant_is_used_when_configured() {
    let mut server = Server::new();
    let base = server.url();
    let token = server
        .mock("POST", "/api/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "rt-123".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "user-tok", "expires_in": 3600}).to_string())
        .expect(1)
        .create();
    let albums = server
        .mock("GET", "/artists/A1/albums")
        .match_query(Matcher::UrlEncoded("include_groups".into(), "album,single".into()))
        .match_header("authorization", "Bearer user-tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [], "next": null}).to_string())
        .create();

    let mut cfg = settings(&base);
    cfg.refresh_token = Some("rt-123".into());
    let catalog = SpotifyCatalog::new(cfg).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let page = rt.block_on(catalog.fetch_artist_albums_page("A1", None)).unwrap();
    assert!(page.items.is_empty());
    token.assert();
    albums.assert();
}

#[test]
fn token_failure_is_reported() {
    let mut server = Server::new();
    let base = server.url();
    let _m = server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"invalid_client"}"#)
        .create();

    let catalog = SpotifyCatalog::new(settings(&base)).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let err = rt.block_on(catalog.fetch_playlist_metadata("P1")).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Failed to obtain token"));
    assert!(msg.contains("invalid_client"));
}
