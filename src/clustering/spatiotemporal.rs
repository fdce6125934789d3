//! Geographic-then-temporal clustering of the changeset window

use serde::Serialize;
use tracing::{debug, info};

use super::forel::Forel;
use super::ClusterError;
use crate::config::ClusteringConfig;
use crate::types::Changeset;

/// Output of one clustering run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusteringReport {
    /// Number of geographic clusters formed
    pub geo_cluster_count: usize,
    /// Hour-scale temporal clusters across every geographic cluster
    pub hour_clusters: Vec<Vec<Changeset>>,
    /// Day-scale temporal clusters; reported, consulted by nothing
    pub day_clusters: Vec<Vec<Changeset>>,
}

/// Three FOREL passes sharing epsilon and iteration cap.
#[derive(Debug, Clone)]
pub struct SpatioTemporalClusterer {
    geo: Forel,
    hour: Forel,
    day: Forel,
}

impl SpatioTemporalClusterer {
    pub fn from_config(config: &ClusteringConfig) -> Self {
        let forel = |radius| Forel::new(radius, config.convergence_epsilon, config.max_iterations);
        Self {
            geo: forel(config.geo_radius_deg),
            hour: forel(config.hour_radius_secs),
            day: forel(config.day_radius_secs),
        }
    }

    /// Cluster by bounding-box center, then split each geographic cluster by
    /// `created_at` at both temporal scales.
    pub fn cluster(&self, changesets: Vec<Changeset>) -> Result<ClusteringReport, ClusterError> {
        let total = changesets.len();
        let geo_clusters = self.geo.partition(changesets, Changeset::center)?;

        let mut report = ClusteringReport {
            geo_cluster_count: geo_clusters.len(),
            ..ClusteringReport::default()
        };

        for geo_cluster in geo_clusters {
            let day = self
                .day
                .partition(geo_cluster.clone(), Changeset::time_position)?;
            let hour = self.hour.partition(geo_cluster, Changeset::time_position)?;
            debug!(
                hour_clusters = hour.len(),
                day_clusters = day.len(),
                "Temporal split of geographic cluster"
            );
            report.hour_clusters.extend(hour);
            report.day_clusters.extend(day);
        }

        info!(
            changesets = total,
            geo = report.geo_cluster_count,
            hour = report.hour_clusters.len(),
            day = report.day_clusters.len(),
            "Clustering complete"
        );
        Ok(report)
    }
}
