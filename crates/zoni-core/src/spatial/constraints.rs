//! Environmental and risk screening: flood and landslide susceptibility,
//! riparian buffer and mangrove protected areas.

use geo::{BoundingRect, Intersects};
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisMessage, Component};
use crate::rules::parameters::decimal_from_json;
use crate::spatial::geometry::{intersection_area, polygons_of, ParcelGeometry};
use crate::spatial::index::FeatureIndex;
use crate::spatial::provider::{find_field, Feature, GeometryProvider, LayerRole, VectorLayer};

pub const CLASS_FIELD_CANDIDATES: [&str; 4] = ["CLASSE", "classe", "NIVEL", "nivel"];
pub const WIDTH_FIELD_CANDIDATES: [&str; 4] = ["LARGURA", "largura", "LARG_FAIX", "larg_faix"];

pub const FLAG_FLOOD: &str = "FLOOD_RISK";
pub const FLAG_LANDSLIDE: &str = "LANDSLIDE_RISK";
pub const FLAG_RIPARIAN: &str = "APP_RIPARIAN_BUFFER";
pub const FLAG_MANGROVE: &str = "APP_MANGROVE";

const RIPARIAN_PENDING: &str = "The parcel lies wholly or partly within a watercourse marginal strip \
    mapped as a permanent preservation area in a consolidated urban area. Occupation, extension or \
    regularization within this strip depends on a specific review under the applicable federal and \
    municipal legislation.";
const MANGROVE_PENDING: &str = "The parcel intersects an area registered as mangrove permanent \
    preservation area, a category with reinforced environmental protection. Interventions there are \
    severely restricted and must be reviewed under the federal, state and municipal environmental \
    legislation in force.";
const APP_LEGAL_NOTE: &str = "Permanent preservation area classification in consolidated urban areas \
    and the protection strips follow from federal legislation on urban preservation areas, land \
    subdivision law and specific municipal norms. This analysis uses the official reference layers \
    as its basis.";
const NO_APP_NOTE: &str = "No permanent preservation area (riparian buffer or mangrove) was \
    identified for the parcel in the reference layers.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardFinding {
    /// Susceptibility class of the first intersecting feature, if recorded.
    pub class: Option<String>,
    pub feature_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectedAreaFinding {
    pub screened: bool,
    pub present: bool,
    pub area_m2: f64,
    /// Widest strip width recorded on the intersecting features.
    pub buffer_width_m: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalConstraints {
    pub flood: Option<HazardFinding>,
    pub landslide: Option<HazardFinding>,
    pub riparian_buffer: ProtectedAreaFinding,
    pub mangrove: ProtectedAreaFinding,
    pub flags: Vec<String>,
    pub pending: Vec<String>,
    pub observations: Vec<String>,
    pub unscreened_layers: Vec<LayerRole>,
}

impl EnvironmentalConstraints {
    pub fn in_protected_area(&self) -> bool {
        self.riparian_buffer.present || self.mangrove.present
    }
}

/// Features of `layer` whose polygons intersect the parcel, in feature order.
fn intersecting<'a>(parcel: &ParcelGeometry, layer: &'a dyn VectorLayer) -> Vec<(usize, &'a Feature)> {
    let features = layer.features();
    let Some(bounds) = parcel.polygon().bounding_rect() else {
        return Vec::new();
    };
    FeatureIndex::build(features)
        .candidates(&bounds)
        .into_iter()
        .filter(|&idx| {
            polygons_of(&features[idx].geometry)
                .iter()
                .any(|p| p.intersects(parcel.polygon()))
        })
        .map(|idx| (idx, &features[idx]))
        .collect()
}

fn screen_hazard(parcel: &ParcelGeometry, layer: &dyn VectorLayer) -> Option<HazardFinding> {
    let (feature_index, feature) = intersecting(parcel, layer).into_iter().next()?;
    let class = find_field(layer.field_names(), &CLASS_FIELD_CANDIDATES, &[])
        .and_then(|field| feature.attribute_text(&field));
    Some(HazardFinding {
        class,
        feature_index,
    })
}

fn screen_protected(parcel: &ParcelGeometry, layer: &dyn VectorLayer) -> ProtectedAreaFinding {
    let hits = intersecting(parcel, layer);
    let width_field = find_field(layer.field_names(), &WIDTH_FIELD_CANDIDATES, &[]);
    let mut finding = ProtectedAreaFinding {
        screened: true,
        present: !hits.is_empty(),
        ..ProtectedAreaFinding::default()
    };
    for (_, feature) in hits {
        finding.area_m2 += intersection_area(parcel.polygon(), &feature.geometry).unwrap_or(0.0);
        let width = width_field
            .as_deref()
            .and_then(|field| feature.attributes.get(field))
            .and_then(decimal_from_json);
        if let Some(width) = width {
            finding.buffer_width_m = Some(finding.buffer_width_m.map_or(width, |w| w.max(width)));
        }
    }
    finding
}

fn hazard_note(kind: &str, finding: &HazardFinding) -> String {
    match &finding.class {
        Some(class) => format!("Parcel lies in a {kind} susceptibility area (class {class})."),
        None => format!("Parcel lies in a {kind} susceptibility area."),
    }
}

/// Screen the parcel against every constraint layer the provider offers.
pub fn screen(
    parcel: &ParcelGeometry,
    provider: &dyn GeometryProvider,
    messages: &mut Vec<AnalysisMessage>,
) -> EnvironmentalConstraints {
    let mut out = EnvironmentalConstraints::default();

    for (role, kind, flag) in [
        (LayerRole::FloodRisk, "flood", FLAG_FLOOD),
        (LayerRole::LandslideRisk, "landslide", FLAG_LANDSLIDE),
    ] {
        let Some(layer) = provider.vector_layer(role) else {
            out.unscreened_layers.push(role);
            continue;
        };
        if let Some(finding) = screen_hazard(parcel, layer) {
            out.flags.push(flag.to_string());
            out.observations.push(hazard_note(kind, &finding));
            match role {
                LayerRole::FloodRisk => out.flood = Some(finding),
                _ => out.landslide = Some(finding),
            }
        }
    }

    match provider.vector_layer(LayerRole::AppBuffer) {
        Some(layer) => out.riparian_buffer = screen_protected(parcel, layer),
        None => out.unscreened_layers.push(LayerRole::AppBuffer),
    }
    match provider.vector_layer(LayerRole::Mangrove) {
        Some(layer) => out.mangrove = screen_protected(parcel, layer),
        None => out.unscreened_layers.push(LayerRole::Mangrove),
    }

    if out.riparian_buffer.present {
        out.flags.push(FLAG_RIPARIAN.to_string());
        out.pending.push(RIPARIAN_PENDING.to_string());
        if let Some(width) = out.riparian_buffer.buffer_width_m {
            out.observations.push(format!(
                "Strip width recorded on the intersecting feature: {width:.2} m (to be checked against the source data)."
            ));
        }
    }
    if out.mangrove.present {
        out.flags.push(FLAG_MANGROVE.to_string());
        out.pending.push(MANGROVE_PENDING.to_string());
    }
    if out.in_protected_area() {
        out.observations.push(APP_LEGAL_NOTE.to_string());
    } else if out.riparian_buffer.screened || out.mangrove.screened {
        out.observations.push(NO_APP_NOTE.to_string());
    }

    if !out.unscreened_layers.is_empty() {
        let names: Vec<&str> = out.unscreened_layers.iter().map(|r| r.as_str()).collect();
        messages.push(AnalysisMessage::info(
            Component::Constraints,
            format!("Constraint layers not provided: {}.", names.join(", ")),
        ));
    }

    tracing::debug!(flags = ?out.flags, "constraints screened");
    out
}
