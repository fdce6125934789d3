//! Ingestion Integration Tests
//!
//! Drives `run_update` against an in-memory replication feed and a temporary
//! sled store: bootstrap, resume, failure atomicity and payload filtering.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::Arc;

use raid_detector::config::DetectorConfig;
use raid_detector::replication::{MemorySource, RemoteSource};
use raid_detector::storage::ChangesetStore;
use raid_detector::{run_update, PipelineError, ReplicationError};

// ============================================================================
// Fixtures
// ============================================================================

fn state(sequence: u64) -> String {
    format!("---\nlast_run: 2024-05-01 12:00:03.041713000 +00:00\nsequence: {sequence}\n")
}

fn gz(xml: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn closed(id: i64, created_at: &str) -> String {
    format!(
        r#"<changeset id="{id}" created_at="{created_at}" closed_at="{created_at}" open="false" num_changes="4" user="mapper{id}" uid="{id}" min_lat="10.0" max_lat="10.0" min_lon="20.0" max_lon="20.0"><tag k="created_by" v="iD"/></changeset>"#
    )
}

fn delta(elements: &[String]) -> Vec<u8> {
    gz(&format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><osm version="0.6" generator="replicate_changesets.rb">{}</osm>"#,
        elements.concat()
    ))
}

fn config() -> DetectorConfig {
    let mut config = DetectorConfig::default();
    config.replication.threads = 2;
    config
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn bootstrap_records_watermark_and_ingests_nothing() {
    let store = ChangesetStore::open_temp().unwrap();
    let source = Arc::new(MemorySource::new().with_resource("state.yaml", state(6_081_234)));

    let summary = run_update(&config(), &store, source.clone()).await.unwrap();

    assert_eq!(summary.previous_sequence, None);
    assert_eq!(summary.resources_fetched, 0);
    assert_eq!(store.get_state().unwrap(), Some(6_081_234));
    assert!(store.is_empty());
    // Only the state descriptor was requested
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn resume_fetches_exactly_the_gap() {
    let store = ChangesetStore::open_temp().unwrap();
    store.set_state(100).unwrap();

    let source = Arc::new(
        MemorySource::new()
            .with_resource("state.yaml", state(103))
            .with_resource("000/000/100.osm.gz", delta(&[closed(1, "2024-05-01T10:00:00Z")]))
            .with_resource("000/000/101.osm.gz", delta(&[closed(2, "2024-05-01T11:00:00Z")]))
            .with_resource(
                "000/000/102.osm.gz",
                delta(&[closed(3, "2024-05-01T11:30:00Z"), closed(4, "2024-05-01T11:40:00Z")]),
            )
            .with_resource("000/000/103.osm.gz", delta(&[closed(5, "2024-05-01T12:00:00Z")])),
    );

    let summary = run_update(&config(), &store, source.clone()).await.unwrap();

    assert_eq!(summary.resources_fetched, 3);
    assert_eq!(summary.changesets_stored, 4);
    assert_eq!(store.get_state().unwrap(), Some(103));

    let mut ids: Vec<i64> = store.load_window().unwrap().iter().map(|c| c.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 3, 4, 5]);
    // state.yaml + 101..=103, never 100
    assert_eq!(source.fetch_count(), 4);
}

#[tokio::test]
async fn up_to_date_run_is_a_no_op() {
    let store = ChangesetStore::open_temp().unwrap();
    store.set_state(42).unwrap();
    let source = Arc::new(MemorySource::new().with_resource("state.yaml", state(42)));

    let summary = run_update(&config(), &store, source).await.unwrap();
    assert_eq!(summary.resources_fetched, 0);
    assert_eq!(store.get_state().unwrap(), Some(42));
}

#[tokio::test]
async fn failing_resource_leaves_store_and_watermark_untouched() {
    let store = ChangesetStore::open_temp().unwrap();
    store.set_state(10).unwrap();

    // 12 is missing from the feed
    let source = Arc::new(
        MemorySource::new()
            .with_resource("state.yaml", state(13))
            .with_resource("000/000/011.osm.gz", delta(&[closed(1, "2024-05-01T10:00:00Z")]))
            .with_resource("000/000/013.osm.gz", delta(&[closed(3, "2024-05-01T10:00:00Z")])),
    );

    let err = run_update(&config(), &store, source).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Replication(ReplicationError::Fetch { .. })
    ));
    assert_eq!(store.get_state().unwrap(), Some(10));
    assert!(store.is_empty());
}

#[tokio::test]
async fn malformed_resource_aborts_the_run() {
    let store = ChangesetStore::open_temp().unwrap();
    store.set_state(10).unwrap();

    let bad = r#"<changeset id="2" created_at="not-a-date" open="false" num_changes="1" uid="1" min_lat="1" max_lat="1" min_lon="1" max_lon="1"/>"#;
    let source = Arc::new(
        MemorySource::new()
            .with_resource("state.yaml", state(11))
            .with_resource(
                "000/000/011.osm.gz",
                delta(&[closed(1, "2024-05-01T10:00:00Z"), bad.to_string()]),
            ),
    );

    let err = run_update(&config(), &store, source).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Replication(ReplicationError::Parse { .. })
    ));
    assert_eq!(store.get_state().unwrap(), Some(10));
    assert!(store.is_empty());
}

#[tokio::test]
async fn cut_off_resource_aborts_the_run() {
    let store = ChangesetStore::open_temp().unwrap();
    store.set_state(10).unwrap();

    // Transfer stopped after two complete elements, before `</osm>`
    let cut = format!(
        r#"<osm version="0.6">{}{}"#,
        closed(1, "2024-05-01T10:00:00Z"),
        closed(2, "2024-05-01T10:05:00Z")
    );
    let source = Arc::new(
        MemorySource::new()
            .with_resource("state.yaml", state(11))
            .with_resource("000/000/011.osm.gz", gz(&cut)),
    );

    let err = run_update(&config(), &store, source).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Replication(ReplicationError::Parse { .. })
    ));
    assert_eq!(store.get_state().unwrap(), Some(10));
    assert!(store.is_empty());
}

#[tokio::test]
async fn empty_resource_body_aborts_the_run() {
    let store = ChangesetStore::open_temp().unwrap();
    store.set_state(10).unwrap();
    let source = Arc::new(
        MemorySource::new()
            .with_resource("state.yaml", state(11))
            .with_resource("000/000/011.osm.gz", gz("")),
    );

    assert!(run_update(&config(), &store, source).await.is_err());
    assert_eq!(store.get_state().unwrap(), Some(10));
}

#[tokio::test]
async fn unreachable_feed_is_remote_unavailable() {
    let store = ChangesetStore::open_temp().unwrap();
    let source: Arc<dyn RemoteSource> = Arc::new(MemorySource::new());

    let err = run_update(&config(), &store, source).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Replication(ReplicationError::RemoteUnavailable(_))
    ));
    assert_eq!(store.get_state().unwrap(), None);
}

#[tokio::test]
async fn filter_keeps_only_closed_nonempty_bounded_changesets() {
    let store = ChangesetStore::open_temp().unwrap();
    store.set_state(1).unwrap();

    let open = r#"<changeset id="20" created_at="2024-05-01T10:00:00Z" open="true" num_changes="3" uid="1" min_lat="1" max_lat="1" min_lon="1" max_lon="1"/>"#;
    let empty = r#"<changeset id="21" created_at="2024-05-01T10:00:00Z" open="false" num_changes="0" uid="1"/>"#;
    let unbounded = r#"<changeset id="22" created_at="2024-05-01T10:00:00Z" open="false" num_changes="3" uid="1" min_lat="1" max_lat="1" min_lon="1"/>"#;

    let source = Arc::new(
        MemorySource::new()
            .with_resource("state.yaml", state(2))
            .with_resource(
                "000/000/002.osm.gz",
                delta(&[
                    open.to_string(),
                    closed(23, "2024-05-01T10:00:00Z"),
                    empty.to_string(),
                    unbounded.to_string(),
                ]),
            ),
    );

    let summary = run_update(&config(), &store, source).await.unwrap();
    assert_eq!(summary.changesets_stored, 1);
    let window = store.load_window().unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].id, 23);
    assert_eq!(window[0].user, "mapper23");
}

#[tokio::test]
async fn prune_runs_after_ingestion() {
    let store = ChangesetStore::open_temp().unwrap();
    store.set_state(1).unwrap();

    // Three days apart: the oldest falls outside the 48 h window
    let source = Arc::new(
        MemorySource::new()
            .with_resource("state.yaml", state(3))
            .with_resource("000/000/002.osm.gz", delta(&[closed(1, "2024-05-01T00:00:00Z")]))
            .with_resource("000/000/003.osm.gz", delta(&[closed(2, "2024-05-04T00:00:00Z")])),
    );

    let summary = run_update(&config(), &store, source).await.unwrap();
    assert_eq!(summary.changesets_stored, 2);
    assert_eq!(summary.changesets_pruned, 1);

    let window = store.load_window().unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].id, 2);
}

#[tokio::test]
async fn reingesting_the_same_delta_is_idempotent() {
    let store = ChangesetStore::open_temp().unwrap();
    let payload = delta(&[closed(1, "2024-05-01T10:00:00Z"), closed(2, "2024-05-01T10:05:00Z")]);

    for _ in 0..2 {
        store.set_state(4).unwrap();
        let source = Arc::new(
            MemorySource::new()
                .with_resource("state.yaml", state(5))
                .with_resource("000/000/005.osm.gz", payload.clone()),
        );
        run_update(&config(), &store, source).await.unwrap();
    }

    assert_eq!(store.len(), 2);
}
