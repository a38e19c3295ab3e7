//! Shared guardrails for analysis tunables and raster window sizes.

// Frontage search
pub const DEFAULT_MAX_SEARCH_DISTANCE_M: f64 = 20.0;
pub const MIN_SEARCH_DISTANCE_M: f64 = 0.5;
pub const MAX_SEARCH_DISTANCE_M: f64 = 200.0;

// Outward probe
pub const DEFAULT_PROBE_OFFSET_M: f64 = 1.0;
pub const MIN_PROBE_OFFSET_M: f64 = 0.01;
pub const MAX_PROBE_OFFSET_M: f64 = 10.0;

// Slope sampling
pub const DEFAULT_AREA_MISMATCH_TOLERANCE: f64 = 0.20;
pub const MAX_AREA_MISMATCH_TOLERANCE: f64 = 1.0;
pub const MAX_RASTER_PIXELS: usize = 25_000_000;
pub const NODATA_TOLERANCE: f64 = 1e-4;
pub const MIN_SLOPE_DEGREES: f64 = 0.0;
pub const MAX_SLOPE_DEGREES: f64 = 90.0;
pub const MAX_SLOPE_DEADLINE_MS: u64 = 600_000;

pub fn clamp_f64(value: f64, minimum: f64, maximum: f64) -> f64 {
    if value.is_nan() {
        return minimum;
    }
    value.max(minimum).min(maximum)
}

pub fn clamp_search_distance(value: f64) -> f64 {
    clamp_f64(value, MIN_SEARCH_DISTANCE_M, MAX_SEARCH_DISTANCE_M)
}

pub fn clamp_probe_offset(value: f64) -> f64 {
    clamp_f64(value, MIN_PROBE_OFFSET_M, MAX_PROBE_OFFSET_M)
}

pub fn clamp_mismatch_tolerance(value: f64) -> f64 {
    clamp_f64(value, 0.0, MAX_AREA_MISMATCH_TOLERANCE)
}

pub fn clamp_deadline_ms(value: u64) -> u64 {
    value.clamp(1, MAX_SLOPE_DEADLINE_MS)
}

/// Whether a `rows x cols` raster window may be read in one block.
pub fn raster_window_allowed(rows: usize, cols: usize) -> bool {
    rows.checked_mul(cols)
        .is_some_and(|pixels| pixels > 0 && pixels <= MAX_RASTER_PIXELS)
}
