//! Frontage / divide classification of the parcel perimeter.
//!
//! Every ring segment is probed on both sides at a small offset from its
//! midpoint. The side the parcel does not contain is outward. An outward probe
//! that lands inside another parcel makes the segment a divide with that
//! parcel's owner; otherwise a ray cast along the outward normal looks for the
//! nearest road, which makes the segment frontage on that street. Anything
//! else is an open divide.

use geo::{BoundingRect, Contains, Coord, EuclideanDistance, EuclideanLength, Intersects, Line, Point};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::analysis::config::AnalysisConfig;
use crate::models::{AnalysisMessage, Component};
use crate::spatial::geometry::{line_strings_of, polygons_of, ParcelGeometry};
use crate::spatial::index::FeatureIndex;
use crate::spatial::provider::{find_field, VectorLayer};

pub const STREET_FIELD_CANDIDATES: [&str; 10] = [
    "NOME",
    "nome",
    "Name",
    "NAME",
    "nm_logradouro",
    "NM_LOGRADOURO",
    "nm_lograd",
    "NM_LOGRAD",
    "TEXTO",
    "texto",
];
const STREET_FIELD_FRAGMENTS: [&str; 2] = ["nome", "name"];

pub const OWNER_FIELD_CANDIDATES: [&str; 7] = [
    "proprietario",
    "PROPRIETARIO",
    "Proprietario",
    "proprietário",
    "PROPRIETÁRIO",
    "PROPRIET",
    "propriet",
];
const OWNER_FIELD_FRAGMENTS: [&str; 2] = ["propriet", "owner"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentKind {
    Frontage {
        street_name: String,
    },
    Divide {
        neighbor_id: Option<String>,
        adjoins_parcel: bool,
    },
}

impl SegmentKind {
    pub fn is_frontage(&self) -> bool {
        matches!(self, SegmentKind::Frontage { .. })
    }

    /// A divide with no identified confronting party.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            SegmentKind::Divide {
                neighbor_id: None,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundarySegment {
    pub id: usize,
    pub start: [f64; 2],
    pub end: [f64; 2],
    pub length_m: f64,
    #[serde(flatten)]
    pub kind: SegmentKind,
    pub outward_ambiguous: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryResult {
    pub segments: Vec<BoundarySegment>,
    pub frontage_by_street: IndexMap<String, f64>,
    pub divide_by_neighbor: IndexMap<String, f64>,
    pub perimeter_m: f64,
    pub frontage_length_m: f64,
    pub divide_length_m: f64,
    pub open_length_m: f64,
    pub street_field: Option<String>,
    pub owner_field: Option<String>,
}

impl BoundaryResult {
    pub fn frontage_streets(&self) -> impl Iterator<Item = &str> {
        self.frontage_by_street.keys().map(String::as_str)
    }

    pub fn has_frontage(&self) -> bool {
        !self.frontage_by_street.is_empty()
    }

    pub fn ambiguous_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.outward_ambiguous).count()
    }
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

struct LayerContext<'a> {
    layer: &'a dyn VectorLayer,
    index: FeatureIndex,
    field: Option<String>,
}

impl<'a> LayerContext<'a> {
    fn new(layer: &'a dyn VectorLayer, candidates: &[&str], fragments: &[&str]) -> Self {
        Self {
            index: FeatureIndex::build(layer.features()),
            field: find_field(layer.field_names(), candidates, fragments),
            layer,
        }
    }
}

/// Unit outward normal of `line` plus whether the choice was a tie.
fn outward_normal(parcel: &ParcelGeometry, line: &Line<f64>, offset: f64) -> (Coord<f64>, bool) {
    let length = line.euclidean_length();
    let ux = line.dx() / length;
    let uy = line.dy() / length;
    let mid = midpoint(line);
    let left = Coord { x: -uy, y: ux };
    let right = Coord { x: uy, y: -ux };

    let left_inside = parcel.contains_point(mid.x + left.x * offset, mid.y + left.y * offset);
    let right_inside = parcel.contains_point(mid.x + right.x * offset, mid.y + right.y * offset);
    match (left_inside, right_inside) {
        (true, false) => (right, false),
        (false, true) => (left, false),
        _ => (right, true),
    }
}

fn midpoint(line: &Line<f64>) -> Coord<f64> {
    Coord {
        x: (line.start.x + line.end.x) / 2.0,
        y: (line.start.y + line.end.y) / 2.0,
    }
}

/// First neighbor parcel (lowest feature index) containing the point.
fn neighbor_at(ctx: &LayerContext<'_>, point: Point<f64>) -> Option<usize> {
    let features = ctx.layer.features();
    ctx.index
        .candidates_at(point.x(), point.y())
        .into_iter()
        .find(|&idx| {
            polygons_of(&features[idx].geometry)
                .iter()
                .any(|p| p.contains(&point))
        })
}

/// Nearest road crossed by the outward ray; ties keep the lowest index.
fn nearest_road(ctx: &LayerContext<'_>, mid: Coord<f64>, ray: &Line<f64>) -> Option<usize> {
    let features = ctx.layer.features();
    let origin = Point::from(mid);
    let mut best: Option<(usize, f64)> = None;
    for idx in ctx.index.candidates(&ray.bounding_rect()) {
        for line_string in line_strings_of(&features[idx].geometry) {
            if !line_string.intersects(ray) {
                continue;
            }
            let distance = origin.euclidean_distance(&line_string);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((idx, distance));
            }
        }
    }
    best.map(|(idx, _)| idx)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify every perimeter segment of `parcel`. Missing layers or fields
/// degrade to open divides with an advisory; this never fails.
pub fn classify(
    parcel: &ParcelGeometry,
    neighbors: Option<&dyn VectorLayer>,
    roads: Option<&dyn VectorLayer>,
    config: &AnalysisConfig,
    messages: &mut Vec<AnalysisMessage>,
) -> BoundaryResult {
    let neighbor_ctx = neighbors.map(|layer| {
        LayerContext::new(layer, &OWNER_FIELD_CANDIDATES, &OWNER_FIELD_FRAGMENTS)
    });
    match &neighbor_ctx {
        None => messages.push(AnalysisMessage::advisory(
            Component::Boundary,
            "Parcel layer not provided; divides cannot name the confronting party.",
        )),
        Some(ctx) if ctx.field.is_none() => messages.push(AnalysisMessage::info(
            Component::Boundary,
            format!(
                "Parcel layer '{}' has no owner field; adjoining parcels are reported without identifier.",
                ctx.layer.name()
            ),
        )),
        Some(_) => {}
    }

    let road_ctx = match roads {
        None => {
            messages.push(AnalysisMessage::advisory(
                Component::Boundary,
                "Road layer not provided; segments without a neighbor parcel are open divides.",
            ));
            None
        }
        Some(layer) => {
            let ctx = LayerContext::new(layer, &STREET_FIELD_CANDIDATES, &STREET_FIELD_FRAGMENTS);
            if ctx.field.is_none() {
                messages.push(AnalysisMessage::advisory(
                    Component::Boundary,
                    format!(
                        "Road layer '{}' has no street-name field; frontage cannot be identified.",
                        layer.name()
                    ),
                ));
                None
            } else {
                Some(ctx)
            }
        }
    };

    let mut result = BoundaryResult {
        street_field: road_ctx.as_ref().and_then(|c| c.field.clone()),
        owner_field: neighbor_ctx.as_ref().and_then(|c| c.field.clone()),
        ..BoundaryResult::default()
    };

    let offset = config.probe_offset_m;
    let reach = config.max_search_distance_m;
    let mut next_id = 1usize;

    for ring in parcel.rings() {
        for line in ring.lines() {
            let length_m = line.euclidean_length();
            if !(length_m > 0.0) {
                continue;
            }
            let (normal, outward_ambiguous) = outward_normal(parcel, &line, offset);
            let mid = midpoint(&line);
            let probe = Point::new(mid.x + normal.x * offset, mid.y + normal.y * offset);

            let neighbor = neighbor_ctx
                .as_ref()
                .and_then(|ctx| neighbor_at(ctx, probe).map(|idx| (ctx, idx)));

            let kind = if let Some((ctx, idx)) = neighbor {
                let neighbor_id = ctx
                    .field
                    .as_deref()
                    .and_then(|field| ctx.layer.features()[idx].attribute_text(field));
                SegmentKind::Divide {
                    neighbor_id,
                    adjoins_parcel: true,
                }
            } else {
                let ray = Line::new(
                    mid,
                    Coord {
                        x: mid.x + normal.x * reach,
                        y: mid.y + normal.y * reach,
                    },
                );
                // A hit road without a name value does not make a frontage.
                let street_name = road_ctx.as_ref().and_then(|ctx| {
                    let idx = nearest_road(ctx, mid, &ray)?;
                    let field = ctx.field.as_deref()?;
                    ctx.layer.features()[idx].attribute_text(field)
                });
                match street_name {
                    Some(street_name) => SegmentKind::Frontage { street_name },
                    None => SegmentKind::Divide {
                        neighbor_id: None,
                        adjoins_parcel: false,
                    },
                }
            };

            result.perimeter_m += length_m;
            match &kind {
                SegmentKind::Frontage { street_name } => {
                    result.frontage_length_m += length_m;
                    *result
                        .frontage_by_street
                        .entry(street_name.clone())
                        .or_insert(0.0) += length_m;
                }
                SegmentKind::Divide { neighbor_id, .. } => {
                    result.divide_length_m += length_m;
                    match neighbor_id {
                        Some(id) => {
                            *result.divide_by_neighbor.entry(id.clone()).or_insert(0.0) += length_m
                        }
                        None => result.open_length_m += length_m,
                    }
                }
            }

            result.segments.push(BoundarySegment {
                id: next_id,
                start: [line.start.x, line.start.y],
                end: [line.end.x, line.end.y],
                length_m,
                kind,
                outward_ambiguous,
            });
            next_id += 1;
        }
    }

    let ambiguous = result.ambiguous_segments();
    if ambiguous > 0 {
        messages.push(AnalysisMessage::info(
            Component::Boundary,
            format!("{ambiguous} segment(s) had no clear outward side; the right-hand normal was used."),
        ));
    }

    tracing::debug!(
        segments = result.segments.len(),
        frontage_m = result.frontage_length_m,
        divide_m = result.divide_length_m,
        "boundary classified"
    );
    result
}
