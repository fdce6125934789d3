//! Config validation: unknown-key detection with Levenshtein suggestions
//! and suspicious-value checks.
//!
//! The raw TOML is first walked as a `toml::Value` tree and compared against
//! the known field names. Findings are warnings only; a config with a typo
//! still loads, with the mistyped field left at its default.

use std::collections::HashSet;

use super::DetectorConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `DetectorConfig`.
///
/// Any new field added to `DetectorConfig` must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [replication]
        "replication",
        "replication.base_url",
        "replication.threads",
        "replication.http_timeout_secs",
        // [storage]
        "storage",
        "storage.database_path",
        "storage.retention_seconds",
        // [clustering]
        "clustering",
        "clustering.geo_radius_deg",
        "clustering.hour_radius_secs",
        "clustering.day_radius_secs",
        "clustering.convergence_epsilon",
        "clustering.max_iterations",
        // [detection]
        "detection",
        "detection.min_population",
    ];
    keys.iter().copied().collect()
}

/// Collect every dotted key path present in a TOML value tree.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Suspicious Values
// ============================================================================

/// Values that are legal but probably not what the operator meant.
pub fn validate_ranges(config: &DetectorConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if config.replication.threads > 16 {
        warnings.push(ValidationWarning {
            field: "replication.threads".to_string(),
            message: format!(
                "replication.threads = {} opens many parallel connections to the public feed",
                config.replication.threads
            ),
            suggestion: None,
        });
    }

    let c = &config.clustering;
    if c.hour_radius_secs > c.day_radius_secs {
        warnings.push(ValidationWarning {
            field: "clustering.hour_radius_secs".to_string(),
            message: format!(
                "clustering.hour_radius_secs ({}) exceeds day_radius_secs ({})",
                c.hour_radius_secs, c.day_radius_secs
            ),
            suggestion: None,
        });
    }
    if c.geo_radius_deg > 5.0 {
        warnings.push(ValidationWarning {
            field: "clustering.geo_radius_deg".to_string(),
            message: format!(
                "clustering.geo_radius_deg = {} spans far more than a city",
                c.geo_radius_deg
            ),
            suggestion: None,
        });
    }

    let window_secs = config.storage.retention_seconds as f64;
    if c.day_radius_secs > window_secs {
        warnings.push(ValidationWarning {
            field: "clustering.day_radius_secs".to_string(),
            message: format!(
                "clustering.day_radius_secs ({}) is wider than the retention window ({})",
                c.day_radius_secs, config.storage.retention_seconds
            ),
            suggestion: None,
        });
    }

    warnings
}
