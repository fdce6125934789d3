//! Detector Configuration Module
//!
//! Run settings loaded from TOML, replacing hardcoded feed addresses,
//! clustering radii and thresholds with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `RAID_DETECTOR_CONFIG` environment variable (path to TOML file)
//! 2. `raid_detector.toml` in the current working directory
//! 3. Built-in defaults
//!
//! A file that is named or present but unreadable or invalid is an error,
//! never a silent fall back to defaults.
//!
//! ## Usage
//!
//! The loaded value is handed to each component explicitly; nothing reads
//! configuration from process-global state:
//!
//! ```ignore
//! let config = DetectorConfig::load()?;
//! let clusterer = SpatioTemporalClusterer::from_config(&config.clustering);
//! ```

mod detector_config;
pub mod defaults;
pub mod validation;

pub use detector_config::*;
