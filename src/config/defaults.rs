//! System-wide default constants.
//!
//! Grouped by subsystem. Every value here is the built-in default of a
//! `DetectorConfig` field or a fixed property of the replication feed.

// ============================================================================
// Replication Feed
// ============================================================================

/// Base URL of the public changeset replication feed.
pub const REPLICATION_BASE_URL: &str = "https://planet.osm.org/replication/changesets/";

/// State descriptor resource, relative to the base URL.
pub const STATE_RESOURCE: &str = "state.yaml";

/// Extension of every replication delta resource.
pub const RESOURCE_EXTENSION: &str = ".osm.gz";

/// Key of the state descriptor line carrying the current sequence number.
pub const SEQUENCE_KEY: &str = "sequence";

/// Largest sequence number the 9-digit path scheme can address.
pub const MAX_ADDRESSABLE_SEQUENCE: u64 = 999_999_999;

/// `created_at` attribute format (always UTC).
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Number of concurrent download workers.
pub const DOWNLOAD_THREADS: usize = 2;

/// HTTP client timeout for feed requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Storage
// ============================================================================

/// Default store location.
pub const DATABASE_PATH: &str = "./data/raid-detector.db";

/// Retention window relative to the newest stored changeset (seconds).
///
/// 172 800 = 48 hours.
pub const RETENTION_SECONDS: i64 = 172_800;

/// Key of the replication watermark in the config tree.
pub const SERVER_SEQUENCE_KEY: &str = "server_sequence";

// ============================================================================
// Clustering
// ============================================================================

/// Geographic pass radius (degrees, flat lat/lon distance).
pub const GEO_RADIUS_DEG: f64 = 0.1;

/// Hour-scale temporal pass radius (seconds). Drives raid detection.
pub const HOUR_RADIUS_SECS: f64 = 1_800.0;

/// Day-scale temporal pass radius (seconds). Reported only.
pub const DAY_RADIUS_SECS: f64 = 43_200.0;

/// Center movement below which the FOREL fixed point is considered reached.
pub const CONVERGENCE_EPSILON: f64 = 1e-9;

/// Upper bound on fixed-point steps per extracted cluster.
pub const MAX_ITERATIONS: usize = 100;

// ============================================================================
// Detection
// ============================================================================

/// An hour-scale cluster is a raid when its population strictly exceeds this.
pub const MIN_RAID_POPULATION: usize = 5;
