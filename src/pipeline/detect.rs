use serde::Serialize;
use tracing::info;

use super::PipelineError;
use crate::clustering::SpatioTemporalClusterer;
use crate::config::DetectorConfig;
use crate::detection::RaidDetector;
use crate::storage::ChangesetStore;
use crate::types::{Changeset, RaidCandidate};

/// Outcome of one detection run.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub window_size: usize,
    pub geo_cluster_count: usize,
    pub hour_clusters: Vec<Vec<Changeset>>,
    pub day_clusters: Vec<Vec<Changeset>>,
    pub raids: Vec<RaidCandidate>,
}

/// Cluster the retained window and report raid candidates.
///
/// The clustering passes are CPU-bound and run on the blocking pool.
pub async fn run_detect(
    config: &DetectorConfig,
    store: &ChangesetStore,
) -> Result<DetectionReport, PipelineError> {
    let window = store.load_window()?;
    let window_size = window.len();

    let clusterer = SpatioTemporalClusterer::from_config(&config.clustering);
    let detector = RaidDetector::from_config(&config.detection);

    let (clustering, raids) = tokio::task::spawn_blocking(move || {
        let clustering = clusterer.cluster(window)?;
        let raids = detector.detect(&clustering.hour_clusters);
        Ok::<_, PipelineError>((clustering, raids))
    })
    .await??;

    info!(
        window = window_size,
        raids = raids.len(),
        "Detection complete"
    );

    Ok(DetectionReport {
        window_size,
        geo_cluster_count: clustering.geo_cluster_count,
        hour_clusters: clustering.hour_clusters,
        day_clusters: clustering.day_clusters,
        raids,
    })
}
