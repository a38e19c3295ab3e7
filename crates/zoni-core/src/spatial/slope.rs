//! Slope raster → regulatory slope bands.
//!
//! Pixels are sampled on the raster's own lattice, clipped to the part of the
//! raster covering the parcel's bounding box. A pixel counts when its centre is
//! strictly inside the parcel and its value is neither no-data nor outside
//! 0–90 degrees. Rows are processed in parallel.

use geo::Rect;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::cancel::CancellationToken;
use crate::analysis::guards::{
    raster_window_allowed, MAX_SLOPE_DEGREES, MIN_SLOPE_DEGREES, NODATA_TOLERANCE,
};
use crate::errors::{ZoniError, ZoniResult};
use crate::models::{AnalysisMessage, Component};
use crate::spatial::geometry::ParcelGeometry;
use crate::spatial::provider::RasterLayer;

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeBand {
    Flat,
    Gentle,
    Moderate,
    Steep,
    VerySteep,
    Protected,
}

impl SlopeBand {
    pub const ALL: [SlopeBand; 6] = [
        SlopeBand::Flat,
        SlopeBand::Gentle,
        SlopeBand::Moderate,
        SlopeBand::Steep,
        SlopeBand::VerySteep,
        SlopeBand::Protected,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Inclusive upper bound in degrees; `None` for the open-ended top band.
    pub fn upper_degrees(&self) -> Option<f64> {
        match self {
            SlopeBand::Flat => Some(3.0),
            SlopeBand::Gentle => Some(8.0),
            SlopeBand::Moderate => Some(15.0),
            SlopeBand::Steep => Some(30.0),
            SlopeBand::VerySteep => Some(45.0),
            SlopeBand::Protected => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SlopeBand::Flat => "0-3°",
            SlopeBand::Gentle => "3-8°",
            SlopeBand::Moderate => "8-15°",
            SlopeBand::Steep => "15-30°",
            SlopeBand::VerySteep => "30-45°",
            SlopeBand::Protected => ">45° (protected)",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            SlopeBand::Flat => "#1a9641",
            SlopeBand::Gentle => "#fbfdbc",
            SlopeBand::Moderate => "#fee4a1",
            SlopeBand::Steep => "#fec981",
            SlopeBand::VerySteep => "#fdae61",
            SlopeBand::Protected => "#d7191c",
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, SlopeBand::Protected)
    }
}

/// Band of a slope value; `None` for NaN or values outside 0–90.
pub fn band_for(degrees: f64) -> Option<SlopeBand> {
    if !(MIN_SLOPE_DEGREES..=MAX_SLOPE_DEGREES).contains(&degrees) {
        return None;
    }
    SlopeBand::ALL
        .into_iter()
        .find(|band| band.upper_degrees().map_or(true, |upper| degrees <= upper))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlopeBandArea {
    pub band: SlopeBand,
    pub label: String,
    pub color: String,
    pub pixel_count: u64,
    pub area_m2: f64,
    /// Share of the sampled area, 0–100.
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlopeStatistics {
    pub pixels_inside: u64,
    pub valid_pixels: u64,
    pub nodata_pixels: u64,
    pub out_of_range_pixels: u64,
    pub resolution_x: f64,
    pub resolution_y: f64,
    /// Sampled area as a share of the parcel area, 0–100.
    pub coverage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlopeResult {
    pub bands: Vec<SlopeBandArea>,
    pub total_area_m2: f64,
    pub protected_area_m2: f64,
    pub protected_percent: f64,
    pub has_protected_area: bool,
    pub statistics: SlopeStatistics,
}

impl SlopeResult {
    pub fn band(&self, band: SlopeBand) -> &SlopeBandArea {
        &self.bands[band.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlopeOutcome {
    Available(SlopeResult),
    Unavailable { reason: String },
}

impl SlopeOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, SlopeOutcome::Available(_))
    }

    pub fn result(&self) -> Option<&SlopeResult> {
        match self {
            SlopeOutcome::Available(r) => Some(r),
            SlopeOutcome::Unavailable { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    inside: u64,
    nodata: u64,
    out_of_range: u64,
    counts: [u64; 6],
}

impl Tally {
    fn merge(mut self, other: Tally) -> Tally {
        self.inside += other.inside;
        self.nodata += other.nodata;
        self.out_of_range += other.out_of_range;
        for (a, b) in self.counts.iter_mut().zip(other.counts) {
            *a += b;
        }
        self
    }

    fn valid(&self) -> u64 {
        self.counts.iter().sum()
    }
}

fn is_nodata(value: f64, no_data: Option<f64>) -> bool {
    value.is_nan() || no_data.is_some_and(|nd| (value - nd).abs() < NODATA_TOLERANCE)
}

/// Pixel window `(first_row, first_col, rows, cols)` covering `area` on the
/// raster lattice, or `None` when the raster does not reach it.
fn pixel_window(raster: &dyn RasterLayer, area: &Rect<f64>) -> Option<(usize, usize, usize, usize)> {
    let extent = raster.extent();
    let (res_x, res_y) = raster.resolution();
    let (total_rows, total_cols) = raster.dimensions();

    let min_x = area.min().x.max(extent.min().x);
    let max_x = area.max().x.min(extent.max().x);
    let min_y = area.min().y.max(extent.min().y);
    let max_y = area.max().y.min(extent.max().y);
    if !(min_x < max_x && min_y < max_y) {
        return None;
    }

    let first_col = ((min_x - extent.min().x) / res_x).floor().max(0.0) as usize;
    let last_col = (((max_x - extent.min().x) / res_x).ceil() as usize).min(total_cols);
    let first_row = ((extent.max().y - max_y) / res_y).floor().max(0.0) as usize;
    let last_row = (((extent.max().y - min_y) / res_y).ceil() as usize).min(total_rows);
    if last_col <= first_col || last_row <= first_row {
        return None;
    }
    Some((first_row, first_col, last_row - first_row, last_col - first_col))
}

/// Classify the parcel's slope pixels. Every failure mode is an error the
/// caller turns into [`SlopeOutcome::Unavailable`]; nothing is estimated.
pub fn classify(
    parcel: &ParcelGeometry,
    raster: Option<&dyn RasterLayer>,
    reference_area_m2: Option<f64>,
    area_mismatch_tolerance: f64,
    cancel: &CancellationToken,
    messages: &mut Vec<AnalysisMessage>,
) -> ZoniResult<SlopeResult> {
    let raster = raster
        .ok_or_else(|| ZoniError::RasterUnavailable("slope raster not provided".to_string()))?;
    if !raster.is_valid() {
        return Err(ZoniError::RasterUnavailable(format!(
            "slope raster '{}' is not valid",
            raster.name()
        )));
    }
    let (res_x, res_y) = raster.resolution();
    if !(res_x > 0.0 && res_y > 0.0) {
        return Err(ZoniError::RasterUnavailable(format!(
            "slope raster '{}' has no usable resolution",
            raster.name()
        )));
    }

    let (first_row, first_col, rows, cols) = pixel_window(raster, &parcel.bounds())
        .ok_or_else(|| {
            ZoniError::RasterUnavailable(format!(
                "slope raster '{}' does not cover the parcel",
                raster.name()
            ))
        })?;
    if !raster_window_allowed(rows, cols) {
        return Err(ZoniError::RasterUnavailable(format!(
            "parcel window of {rows}x{cols} pixels exceeds the sampling limit"
        )));
    }
    let block = raster
        .read_block(first_row, first_col, rows, cols)
        .ok_or_else(|| {
            ZoniError::RasterUnavailable(format!(
                "could not read a {rows}x{cols} block from '{}'",
                raster.name()
            ))
        })?;

    let extent = raster.extent();
    let no_data = raster.no_data();
    let origin_x = extent.min().x;
    let origin_y = extent.max().y;

    let tally = (0..block.rows)
        .into_par_iter()
        .map(|r| -> ZoniResult<Tally> {
            cancel.check("slope sampling")?;
            let mut tally = Tally::default();
            let y = origin_y - ((first_row + r) as f64 + 0.5) * res_y;
            for c in 0..block.cols {
                let x = origin_x + ((first_col + c) as f64 + 0.5) * res_x;
                if !parcel.contains_point(x, y) {
                    continue;
                }
                tally.inside += 1;
                let value = match block.value(r, c) {
                    Some(value) if !is_nodata(value, no_data) => value,
                    _ => {
                        tally.nodata += 1;
                        continue;
                    }
                };
                match band_for(value) {
                    Some(band) => tally.counts[band.index()] += 1,
                    None => tally.out_of_range += 1,
                }
            }
            Ok(tally)
        })
        .try_reduce(Tally::default, |a, b| Ok(a.merge(b)))?;

    let valid = tally.valid();
    if valid == 0 {
        return Err(ZoniError::RasterUnavailable(format!(
            "no valid slope pixels inside the parcel ({} inside, {} no-data)",
            tally.inside, tally.nodata
        )));
    }

    let pixel_area = (res_x * res_y).abs();
    let total_area_m2 = valid as f64 * pixel_area;
    let bands: Vec<SlopeBandArea> = SlopeBand::ALL
        .into_iter()
        .map(|band| {
            let pixel_count = tally.counts[band.index()];
            let area_m2 = pixel_count as f64 * pixel_area;
            SlopeBandArea {
                band,
                label: band.label().to_string(),
                color: band.color().to_string(),
                pixel_count,
                area_m2,
                percent: area_m2 / total_area_m2 * 100.0,
            }
        })
        .collect();
    let protected = &bands[SlopeBand::Protected.index()];
    let protected_area_m2 = protected.area_m2;
    let protected_percent = protected.percent;
    let has_protected_area = protected.pixel_count > 0;

    let parcel_area = parcel.area_m2();
    let statistics = SlopeStatistics {
        pixels_inside: tally.inside,
        valid_pixels: valid,
        nodata_pixels: tally.nodata,
        out_of_range_pixels: tally.out_of_range,
        resolution_x: res_x,
        resolution_y: res_y,
        coverage_percent: if parcel_area > 0.0 {
            total_area_m2 / parcel_area * 100.0
        } else {
            0.0
        },
    };

    if tally.out_of_range > 0 {
        messages.push(AnalysisMessage::info(
            Component::Slope,
            format!(
                "{} pixel(s) outside 0-90 degrees were ignored.",
                tally.out_of_range
            ),
        ));
    }
    if let Some(reference) = reference_area_m2.filter(|a| *a > 0.0) {
        let mismatch = (total_area_m2 - reference).abs() / reference;
        if mismatch > area_mismatch_tolerance {
            messages.push(AnalysisMessage::advisory(
                Component::Slope,
                format!(
                    "Sampled slope area {total_area_m2:.2} m² differs from the parcel area {reference:.2} m² by {:.1}%; check raster coverage and resolution.",
                    mismatch * 100.0
                ),
            ));
        }
    }

    tracing::debug!(
        valid_pixels = valid,
        total_m2 = total_area_m2,
        protected_m2 = protected_area_m2,
        "slope classified"
    );

    Ok(SlopeResult {
        bands,
        total_area_m2,
        protected_area_m2,
        protected_percent,
        has_protected_area,
        statistics,
    })
}

/// [`classify`] with raster failures folded into `Unavailable`. Cancellation
/// is still an error.
pub fn classify_outcome(
    parcel: &ParcelGeometry,
    raster: Option<&dyn RasterLayer>,
    reference_area_m2: Option<f64>,
    area_mismatch_tolerance: f64,
    cancel: &CancellationToken,
    messages: &mut Vec<AnalysisMessage>,
) -> ZoniResult<SlopeOutcome> {
    match classify(
        parcel,
        raster,
        reference_area_m2,
        area_mismatch_tolerance,
        cancel,
        messages,
    ) {
        Ok(result) => Ok(SlopeOutcome::Available(result)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            let reason = match err {
                ZoniError::RasterUnavailable(reason) => reason,
                other => other.to_string(),
            };
            messages.push(AnalysisMessage::advisory(
                Component::Slope,
                format!("Slope analysis unavailable: {reason}."),
            ));
            Ok(SlopeOutcome::Unavailable { reason })
        }
    }
}
