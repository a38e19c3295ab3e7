//! Analysis tunables with environment overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::guards::{
    clamp_deadline_ms, clamp_mismatch_tolerance, clamp_probe_offset, clamp_search_distance,
    DEFAULT_AREA_MISMATCH_TOLERANCE, DEFAULT_MAX_SEARCH_DISTANCE_M, DEFAULT_PROBE_OFFSET_M,
};

pub const ENV_MAX_FRONTAGE_DISTANCE: &str = "ZONI_MAX_FRONTAGE_DISTANCE_M";
pub const ENV_PROBE_OFFSET: &str = "ZONI_PROBE_OFFSET_M";
pub const ENV_AREA_MISMATCH_TOLERANCE: &str = "ZONI_AREA_MISMATCH_TOLERANCE";
pub const ENV_SLOPE_DEADLINE_MS: &str = "ZONI_SLOPE_DEADLINE_MS";
pub const ENV_ZONE_CODE_FIELD: &str = "ZONI_ZONE_CODE_FIELD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Reach of the outward ray when looking for a fronting road.
    pub max_search_distance_m: f64,
    /// Distance of the inside/outside probes from a segment midpoint.
    pub probe_offset_m: f64,
    /// Relative difference between sampled slope area and parcel area that
    /// triggers an advisory.
    pub area_mismatch_tolerance: f64,
    /// Deadline for raster sampling; `None` means no deadline.
    pub slope_deadline_ms: Option<u64>,
    /// Forced zone-code attribute; detection is used when absent.
    pub zone_code_field: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_search_distance_m: DEFAULT_MAX_SEARCH_DISTANCE_M,
            probe_offset_m: DEFAULT_PROBE_OFFSET_M,
            area_mismatch_tolerance: DEFAULT_AREA_MISMATCH_TOLERANCE,
            slope_deadline_ms: None,
            zone_code_field: None,
        }
    }
}

fn env_f64(name: &str) -> Option<f64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable override");
            None
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by the `ZONI_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_f64(ENV_MAX_FRONTAGE_DISTANCE) {
            config.max_search_distance_m = v;
        }
        if let Some(v) = env_f64(ENV_PROBE_OFFSET) {
            config.probe_offset_m = v;
        }
        if let Some(v) = env_f64(ENV_AREA_MISMATCH_TOLERANCE) {
            config.area_mismatch_tolerance = v;
        }
        if let Some(v) = env_f64(ENV_SLOPE_DEADLINE_MS) {
            if v > 0.0 {
                config.slope_deadline_ms = Some(v as u64);
            }
        }
        if let Ok(field) = std::env::var(ENV_ZONE_CODE_FIELD) {
            let field = field.trim();
            if !field.is_empty() {
                config.zone_code_field = Some(field.to_string());
            }
        }
        config.clamped()
    }

    /// Copy with every tunable forced into its guard range.
    pub fn clamped(mut self) -> Self {
        self.max_search_distance_m = clamp_search_distance(self.max_search_distance_m);
        self.probe_offset_m = clamp_probe_offset(self.probe_offset_m);
        self.area_mismatch_tolerance = clamp_mismatch_tolerance(self.area_mismatch_tolerance);
        self.slope_deadline_ms = self.slope_deadline_ms.map(clamp_deadline_ms);
        self
    }

    pub fn slope_deadline(&self) -> Option<Duration> {
        self.slope_deadline_ms.map(Duration::from_millis)
    }
}
