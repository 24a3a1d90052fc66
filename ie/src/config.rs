//! Matcher and change gate tunables.

use serde::{Deserialize, Serialize};

/// Scale ladder used for every template, ascending and dense around 1.0.
pub const DEFAULT_SCALES: [f64; 19] = [
    0.40, 0.45, 0.50, 0.55, 0.60, 0.65, 0.70, 0.75, 0.80, 0.85, 0.90, 0.95, 1.00, 1.10, 1.20, 1.40,
    1.60, 1.80, 2.00,
];

/// Template matching configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum best-of-scales correlation for a template to produce a candidate.
    pub template_threshold: f64,
    /// Once a scale reaches this score the remaining scales are skipped.
    pub early_exit_score: f64,
    /// Intersection over the smaller box area at which two candidates collide.
    pub nms_overlap: f64,
    pub scales: Vec<f64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            template_threshold: 0.70,
            early_exit_score: 0.95,
            nms_overlap: 0.3,
            scales: DEFAULT_SCALES.to_vec(),
        }
    }
}

/// Change gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Mean absolute pixel difference (0-255) above which a frame counts as changed.
    pub change_threshold: f64,
    /// Force a match cycle when this long has passed since the last one, changed or not.
    pub force_rescan_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            change_threshold: 10.0,
            force_rescan_ms: 2000,
        }
    }
}
