//! Raid detection: population threshold over hour-scale clusters

pub mod geojson;

pub use geojson::{to_feature_collection, FeatureCollection};

use tracing::info;

use crate::config::DetectionConfig;
use crate::types::{Changeset, RaidCandidate};

/// Flags hour-scale clusters whose population exceeds a threshold.
#[derive(Debug, Clone, Copy)]
pub struct RaidDetector {
    min_population: usize,
}

impl RaidDetector {
    pub fn new(min_population: usize) -> Self {
        Self { min_population }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.min_population)
    }

    /// One candidate per cluster with strictly more than `min_population`
    /// members, located at the first member's bounding-box center.
    pub fn detect(&self, hour_clusters: &[Vec<Changeset>]) -> Vec<RaidCandidate> {
        let raids: Vec<RaidCandidate> = hour_clusters
            .iter()
            .filter(|cluster| cluster.len() > self.min_population)
            .filter_map(|cluster| {
                cluster.first().map(|first| RaidCandidate {
                    center: first.center(),
                    magnitude: cluster.len(),
                })
            })
            .collect();

        for raid in &raids {
            info!(center = %raid.center, magnitude = raid.magnitude, "Raid candidate");
        }
        raids
    }
}
