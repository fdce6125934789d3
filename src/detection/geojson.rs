//! GeoJSON rendering of raid candidates
//!
//! A `FeatureCollection` of `Point` features. Coordinates follow GeoJSON
//! axis order `[lon, lat]`; the magnitude is carried as the `title` label.

use serde::{Deserialize, Serialize};

use crate::types::RaidCandidate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    /// `[lon, lat]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    pub title: String,
}

impl From<&RaidCandidate> for Feature {
    fn from(raid: &RaidCandidate) -> Self {
        Self {
            kind: "Feature".to_string(),
            geometry: Geometry {
                kind: "Point".to_string(),
                coordinates: [raid.center.lon, raid.center.lat],
            },
            properties: Properties {
                title: raid.magnitude.to_string(),
            },
        }
    }
}

pub fn to_feature_collection(raids: &[RaidCandidate]) -> FeatureCollection {
    FeatureCollection {
        kind: "FeatureCollection".to_string(),
        features: raids.iter().map(Feature::from).collect(),
    }
}

impl FeatureCollection {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
