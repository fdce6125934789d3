//! Detector Configuration - feed, storage, clustering and detection settings
//!
//! Each section implements `Default` with the values in `defaults`, so a
//! missing file or a partial file behaves exactly like the built-in setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "RAID_DETECTOR_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "raid_detector.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one detector deployment.
///
/// Load with `DetectorConfig::load()` which searches:
/// 1. `$RAID_DETECTOR_CONFIG`
/// 2. `./raid_detector.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Replication feed access
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Changeset store location and retention
    #[serde(default)]
    pub storage: StorageConfig,

    /// FOREL radii and convergence
    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Raid threshold
    #[serde(default)]
    pub detection: DetectionConfig,
}

impl DetectorConfig {
    /// Load configuration using the standard search order.
    ///
    /// A file named by `$RAID_DETECTOR_CONFIG` must exist and be valid, and so
    /// must `./raid_detector.toml` when present. Only the absence of both
    /// falls back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::load_from_search(explicit.as_deref(), Path::new(LOCAL_CONFIG_FILE))
    }

    /// Search order behind [`load`](Self::load) with the candidates spelled out.
    pub fn load_from_search(explicit: Option<&Path>, local: &Path) -> Result<Self, ConfigError> {
        // 1. Explicitly named file
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded detector config from {}", CONFIG_ENV_VAR);
            return Ok(config);
        }

        // 2. Local file
        if local.exists() {
            let config = Self::load_from_file(local)?;
            info!(path = %local.display(), "Loaded detector config");
            return Ok(config);
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
                other => other,
            })?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are reported as warnings and never fail the load.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply command-line overrides on top of the loaded values.
    pub fn with_overrides(mut self, database: Option<PathBuf>, threads: Option<usize>) -> Self {
        if let Some(path) = database {
            self.storage.database_path = path;
        }
        if let Some(n) = threads {
            self.replication.threads = n;
        }
        self
    }

    /// Validate all settings for internal consistency.
    ///
    /// Rules:
    /// - At least one download worker and a non-zero HTTP timeout
    /// - The feed base URL is an http(s) URL
    /// - Retention is positive
    /// - Radii are positive and finite, epsilon is non-negative and finite
    /// - At least one fixed-point iteration is allowed
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let r = &self.replication;
        if r.threads == 0 {
            errors.push("replication.threads must be > 0".to_string());
        }
        if r.http_timeout_secs == 0 {
            errors.push("replication.http_timeout_secs must be > 0".to_string());
        }
        if !(r.base_url.starts_with("http://") || r.base_url.starts_with("https://")) {
            errors.push(format!(
                "replication.base_url must be an http(s) URL, got '{}'",
                r.base_url
            ));
        }

        if self.storage.retention_seconds <= 0 {
            errors.push(format!(
                "storage.retention_seconds must be > 0, got {}",
                self.storage.retention_seconds
            ));
        }
        if self.storage.database_path.as_os_str().is_empty() {
            errors.push("storage.database_path must not be empty".to_string());
        }

        let c = &self.clustering;
        Self::check_radius(c.geo_radius_deg, "clustering.geo_radius_deg", &mut errors);
        Self::check_radius(c.hour_radius_secs, "clustering.hour_radius_secs", &mut errors);
        Self::check_radius(c.day_radius_secs, "clustering.day_radius_secs", &mut errors);
        if !c.convergence_epsilon.is_finite() || c.convergence_epsilon < 0.0 {
            errors.push(format!(
                "clustering.convergence_epsilon must be finite and >= 0, got {}",
                c.convergence_epsilon
            ));
        }
        if c.max_iterations == 0 {
            errors.push("clustering.max_iterations must be > 0".to_string());
        }

        for w in super::validation::validate_ranges(self) {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_radius(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass, so check finiteness first
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} must be finite and > 0, got {value}"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Replication
// ============================================================================

/// Where and how the replication feed is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Feed base URL; resource paths are appended to it
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Concurrent download workers
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Per-request timeout
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_base_url() -> String {
    defaults::REPLICATION_BASE_URL.to_string()
}
fn default_threads() -> usize {
    defaults::DOWNLOAD_THREADS
}
fn default_http_timeout() -> u64 {
    defaults::HTTP_TIMEOUT_SECS
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            threads: default_threads(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the sled database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Rows older than `max(created_at) - retention_seconds` are pruned
    #[serde(default = "default_retention")]
    pub retention_seconds: i64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from(defaults::DATABASE_PATH)
}
fn default_retention() -> i64 {
    defaults::RETENTION_SECONDS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            retention_seconds: default_retention(),
        }
    }
}

// ============================================================================
// Clustering
// ============================================================================

/// FOREL parameters for the geographic and temporal passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Geographic radius, degrees
    #[serde(default = "default_geo_radius")]
    pub geo_radius_deg: f64,

    /// Hour-scale temporal radius, seconds
    #[serde(default = "default_hour_radius")]
    pub hour_radius_secs: f64,

    /// Day-scale temporal radius, seconds
    #[serde(default = "default_day_radius")]
    pub day_radius_secs: f64,

    /// Center movement treated as convergence
    #[serde(default = "default_epsilon")]
    pub convergence_epsilon: f64,

    /// Fixed-point step cap per extracted cluster
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_geo_radius() -> f64 { defaults::GEO_RADIUS_DEG }
fn default_hour_radius() -> f64 { defaults::HOUR_RADIUS_SECS }
fn default_day_radius() -> f64 { defaults::DAY_RADIUS_SECS }
fn default_epsilon() -> f64 { defaults::CONVERGENCE_EPSILON }
fn default_max_iterations() -> usize { defaults::MAX_ITERATIONS }

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            geo_radius_deg: default_geo_radius(),
            hour_radius_secs: default_hour_radius(),
            day_radius_secs: default_day_radius(),
            convergence_epsilon: default_epsilon(),
            max_iterations: default_max_iterations(),
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Population an hour-scale cluster must strictly exceed
    #[serde(default = "default_min_population")]
    pub min_population: usize,
}

fn default_min_population() -> usize {
    defaults::MIN_RAID_POPULATION
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_population: default_min_population(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = DetectorConfig::from_toml_str(
            r#"
[replication]
threads = 4
"#,
        )
        .unwrap();
        assert_eq!(config.replication.threads, 4);
        assert_eq!(config.replication.base_url, defaults::REPLICATION_BASE_URL);
        assert_eq!(config.storage.retention_seconds, 172_800);
        assert_eq!(config.detection.min_population, 5);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let err = DetectorConfig::from_toml_str("[replication]\nthreads = 0\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.contains("replication.threads")));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_negative_radius_rejected() {
        let err =
            DetectorConfig::from_toml_str("[clustering]\ngeo_radius_deg = -0.1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let err = DetectorConfig::from_toml_str("[replication]\nbase_url = \"ftp://example\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_overrides_apply() {
        let config = DetectorConfig::default()
            .with_overrides(Some(PathBuf::from("/tmp/other.db")), Some(8));
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.replication.threads, 8);
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = DetectorConfig::default().to_toml().unwrap();
        let parsed = DetectorConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.clustering.max_iterations, defaults::MAX_ITERATIONS);
    }
}
