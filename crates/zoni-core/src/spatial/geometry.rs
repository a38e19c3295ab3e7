//! Parcel geometry: contiguity check and the union/repair pipeline.
//!
//! A parcel request may name several cadastral lots (a "gleba"). They are
//! dissolved into one polygon in stages:
//!
//! 1. exact union of the parts;
//! 2. tolerant union after snapping every vertex to a 1 mm grid and dropping
//!    repeated vertices;
//! 3. validation of the outcome: exactly one polygon, positive area, no
//!    self-intersecting ring.
//!
//! Boolean operations on degenerate input can panic inside `geo`; every call
//! goes through [`guarded`] so a panic counts as a failed stage instead of
//! tearing down the analysis.

use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{
    Area, BooleanOps, BoundingRect, Contains, Coord, EuclideanDistance, EuclideanLength, Geometry,
    Intersects, Line, LineString, MultiPolygon, Point, Polygon, Rect,
};
use serde::{Deserialize, Serialize};

use crate::errors::{ZoniError, ZoniResult};
use crate::models::ParcelSummary;

/// Vertex snapping grid for the tolerant union stage.
pub const SNAP_GRID_M: f64 = 0.001;
/// Parts closer than this are considered contiguous.
pub const CONTIGUITY_TOLERANCE_M: f64 = SNAP_GRID_M;
/// Polygons smaller than this are union slivers and are dropped.
pub const SLIVER_AREA_M2: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStage {
    Exact,
    Tolerant,
}

impl RepairStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStage::Exact => "exact",
            RepairStage::Tolerant => "tolerant",
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by the spatial components
// ---------------------------------------------------------------------------

/// Run a geometry operation, converting a panic into `None`.
pub fn guarded<T>(op: impl FnOnce() -> T) -> Option<T> {
    catch_unwind(AssertUnwindSafe(op)).ok()
}

/// Areal parts of a geometry; non-areal geometries yield nothing.
pub fn polygons_of(geometry: &Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(polygons_of).collect(),
        _ => Vec::new(),
    }
}

/// Linear parts of a geometry; polygon rings count as lines.
pub fn line_strings_of(geometry: &Geometry<f64>) -> Vec<LineString<f64>> {
    fn rings(polygon: &Polygon<f64>) -> Vec<LineString<f64>> {
        std::iter::once(polygon.exterior().clone())
            .chain(polygon.interiors().iter().cloned())
            .collect()
    }
    match geometry {
        Geometry::Line(l) => vec![LineString::new(vec![l.start, l.end])],
        Geometry::LineString(ls) => vec![ls.clone()],
        Geometry::MultiLineString(mls) => mls.0.clone(),
        Geometry::Polygon(p) => rings(p),
        Geometry::MultiPolygon(mp) => mp.0.iter().flat_map(rings).collect(),
        Geometry::Rect(r) => rings(&r.to_polygon()),
        Geometry::Triangle(t) => rings(&t.to_polygon()),
        Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(line_strings_of).collect(),
        _ => Vec::new(),
    }
}

/// Area of `parcel ∩ geometry`, or `None` when the boolean operation fails.
pub fn intersection_area(parcel: &Polygon<f64>, geometry: &Geometry<f64>) -> Option<f64> {
    let parts = polygons_of(geometry);
    if parts.is_empty() {
        return Some(0.0);
    }
    let subject = MultiPolygon::new(vec![parcel.clone()]);
    let clip = MultiPolygon::new(parts);
    guarded(|| subject.intersection(&clip).unsigned_area())
}

fn ring_is_simple(ring: &LineString<f64>) -> bool {
    let lines: Vec<Line<f64>> = ring
        .lines()
        .filter(|l| l.euclidean_length() > 0.0)
        .collect();
    let n = lines.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            if lines[i].intersects(&lines[j]) {
                return false;
            }
        }
    }
    true
}

/// Structural validity: closed rings of at least four vertices, finite
/// coordinates, positive area, no self-intersecting ring.
pub fn is_valid_polygon(polygon: &Polygon<f64>) -> bool {
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
    for ring in rings {
        if ring.0.len() < 4 || !ring.is_closed() {
            return false;
        }
        if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return false;
        }
        if !ring_is_simple(ring) {
            return false;
        }
    }
    polygon.unsigned_area() > 0.0
}

fn snap_ring(ring: &LineString<f64>) -> LineString<f64> {
    let snap = |v: f64| (v / SNAP_GRID_M).round() * SNAP_GRID_M;
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for c in &ring.0 {
        let snapped = Coord {
            x: snap(c.x),
            y: snap(c.y),
        };
        if coords.last() != Some(&snapped) {
            coords.push(snapped);
        }
    }
    LineString::new(coords)
}

/// Snap every vertex to the 1 mm grid and drop repeated vertices.
pub fn snap_polygon(polygon: &Polygon<f64>) -> Polygon<f64> {
    Polygon::new(
        snap_ring(polygon.exterior()),
        polygon.interiors().iter().map(snap_ring).collect(),
    )
}

fn is_usable_part(polygon: &Polygon<f64>) -> bool {
    polygon.exterior().0.len() >= 4
        && polygon
            .exterior()
            .0
            .iter()
            .all(|c| c.x.is_finite() && c.y.is_finite())
        && polygon.unsigned_area() > 0.0
}

/// Whether the parts form one connected group under "touches or overlaps".
pub fn parts_are_contiguous(parts: &[Polygon<f64>]) -> bool {
    let n = parts.len();
    if n <= 1 {
        return true;
    }
    let mut visited = vec![false; n];
    let mut stack = vec![0usize];
    visited[0] = true;
    while let Some(i) = stack.pop() {
        for j in 0..n {
            if visited[j] {
                continue;
            }
            let touching = parts[i].intersects(&parts[j])
                || parts[i].euclidean_distance(&parts[j]) <= CONTIGUITY_TOLERANCE_M;
            if touching {
                visited[j] = true;
                stack.push(j);
            }
        }
    }
    visited.into_iter().all(|v| v)
}

fn union_all(parts: &[Polygon<f64>]) -> Option<MultiPolygon<f64>> {
    guarded(|| {
        let mut acc = MultiPolygon::new(Vec::new());
        for part in parts {
            acc = acc.union(&MultiPolygon::new(vec![part.clone()]));
        }
        acc
    })
}

/// Reduce a union outcome to the single polygon it must be.
fn single_polygon(union: MultiPolygon<f64>) -> Result<Polygon<f64>, String> {
    let mut polygons: Vec<Polygon<f64>> = union
        .0
        .into_iter()
        .filter(|p| p.unsigned_area() > SLIVER_AREA_M2)
        .collect();
    match polygons.len() {
        0 => Err("union produced an empty geometry".to_string()),
        1 => {
            let polygon = polygons.remove(0);
            if is_valid_polygon(&polygon) {
                Ok(polygon)
            } else {
                Err("union produced a self-intersecting ring".to_string())
            }
        }
        n => Err(format!("union produced {n} disjoint polygons")),
    }
}

// ---------------------------------------------------------------------------
// ParcelGeometry
// ---------------------------------------------------------------------------

/// The analysed parcel: one valid polygon in a projected metric CRS.
#[derive(Debug, Clone)]
pub struct ParcelGeometry {
    polygon: Polygon<f64>,
    part_count: usize,
    repair_stage: RepairStage,
    area_m2: f64,
    perimeter_m: f64,
    bounds: Rect<f64>,
}

impl ParcelGeometry {
    pub fn from_polygon(polygon: Polygon<f64>) -> ZoniResult<Self> {
        Self::dissolve(vec![polygon])
    }

    /// Dissolve the selected lots into one parcel polygon.
    pub fn dissolve(parts: Vec<Polygon<f64>>) -> ZoniResult<Self> {
        let parts: Vec<Polygon<f64>> = parts.into_iter().filter(is_usable_part).collect();
        if parts.is_empty() {
            return Err(ZoniError::InvalidParcelGeometry(
                "no usable parcel geometry".to_string(),
            ));
        }
        if !parts_are_contiguous(&parts) {
            return Err(ZoniError::InvalidParcelGeometry(
                "selected lots are not contiguous".to_string(),
            ));
        }

        let exact = if parts.len() == 1 {
            if is_valid_polygon(&parts[0]) {
                Ok(parts[0].clone())
            } else {
                Err("parcel ring is self-intersecting".to_string())
            }
        } else {
            match union_all(&parts) {
                Some(union) => single_polygon(union),
                None => Err("exact union failed".to_string()),
            }
        };

        let (polygon, stage) = match exact {
            Ok(polygon) => (polygon, RepairStage::Exact),
            Err(reason) => {
                tracing::debug!(%reason, parts = parts.len(), "exact parcel union rejected; snapping");
                let snapped: Vec<Polygon<f64>> = parts.iter().map(snap_polygon).collect();
                let union = union_all(&snapped).ok_or_else(|| {
                    ZoniError::InvalidParcelGeometry(format!(
                        "{reason}; tolerant union failed"
                    ))
                })?;
                let polygon = single_polygon(union).map_err(|tolerant| {
                    ZoniError::InvalidParcelGeometry(format!("{reason}; {tolerant}"))
                })?;
                (polygon, RepairStage::Tolerant)
            }
        };

        let bounds = polygon.bounding_rect().ok_or_else(|| {
            ZoniError::InvalidParcelGeometry("parcel has no extent".to_string())
        })?;
        let area_m2 = polygon.unsigned_area();
        let perimeter_m = polygon.exterior().euclidean_length()
            + polygon
                .interiors()
                .iter()
                .map(|r| r.euclidean_length())
                .sum::<f64>();

        Ok(Self {
            polygon,
            part_count: parts.len(),
            repair_stage: stage,
            area_m2,
            perimeter_m,
            bounds,
        })
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn part_count(&self) -> usize {
        self.part_count
    }

    pub fn repair_stage(&self) -> RepairStage {
        self.repair_stage
    }

    pub fn area_m2(&self) -> f64 {
        self.area_m2
    }

    pub fn perimeter_m(&self) -> f64 {
        self.perimeter_m
    }

    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Strict containment (boundary points are outside).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.polygon.contains(&Point::new(x, y))
    }

    /// Outer ring first, then holes.
    pub fn rings(&self) -> impl Iterator<Item = &LineString<f64>> {
        std::iter::once(self.polygon.exterior()).chain(self.polygon.interiors().iter())
    }

    pub fn summary(&self) -> ParcelSummary {
        ParcelSummary {
            part_count: self.part_count,
            area_m2: self.area_m2,
            perimeter_m: self.perimeter_m,
            repair_stage: self.repair_stage,
            bounds: [
                self.bounds.min().x,
                self.bounds.min().y,
                self.bounds.max().x,
                self.bounds.max().y,
            ],
        }
    }
}
