//! Area of the parcel falling in each zoning code.

use geo::BoundingRect;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisMessage, Component};
use crate::spatial::geometry::{intersection_area, ParcelGeometry};
use crate::spatial::index::FeatureIndex;
use crate::spatial::provider::{find_field, VectorLayer};

/// Zone-code attribute names, in priority order.
pub const ZONE_FIELD_CANDIDATES: [&str; 11] = [
    "Zoneamento",
    "zoneamento",
    "ZONA",
    "zona",
    "ZONE",
    "zone",
    "CODIGO",
    "Codigo",
    "codigo",
    "COD_ZONA",
    "cod_zona",
];

/// Intersections at or below this area are discarded.
pub const MIN_INCIDENCE_AREA_M2: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneIncidence {
    pub zone_code: String,
    pub area_m2: f64,
    /// Share of the parcel area, 0–100.
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneDecomposition {
    /// One entry per code, sorted by code.
    pub incidences: Vec<ZoneIncidence>,
    pub total_area_m2: f64,
    pub parcel_area_m2: f64,
    pub zone_field: Option<String>,
}

impl ZoneDecomposition {
    pub fn empty(parcel_area_m2: f64) -> Self {
        Self {
            parcel_area_m2,
            ..Self::default()
        }
    }

    /// Build from raw per-code areas; zero areas and blank codes drop out.
    pub fn from_areas(
        areas: IndexMap<String, f64>,
        parcel_area_m2: f64,
        zone_field: Option<String>,
    ) -> Self {
        let mut incidences: Vec<ZoneIncidence> = areas
            .into_iter()
            .map(|(code, area)| (code.trim().to_string(), area))
            .filter(|(code, area)| !code.is_empty() && *area > MIN_INCIDENCE_AREA_M2)
            .fold(IndexMap::<String, f64>::new(), |mut acc, (code, area)| {
                *acc.entry(code).or_insert(0.0) += area;
                acc
            })
            .into_iter()
            .map(|(zone_code, area_m2)| ZoneIncidence {
                percent: if parcel_area_m2 > 0.0 {
                    area_m2 / parcel_area_m2 * 100.0
                } else {
                    0.0
                },
                zone_code,
                area_m2,
            })
            .collect();
        incidences.sort_by(|a, b| a.zone_code.cmp(&b.zone_code));
        let total_area_m2 = incidences.iter().map(|i| i.area_m2).sum();
        Self {
            incidences,
            total_area_m2,
            parcel_area_m2,
            zone_field,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.incidences.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.incidences.iter().map(|i| i.zone_code.as_str())
    }

    pub fn area_of(&self, zone_code: &str) -> Option<f64> {
        self.incidences
            .iter()
            .find(|i| i.zone_code == zone_code)
            .map(|i| i.area_m2)
    }
}

fn resolve_field(
    layer: &dyn VectorLayer,
    forced: Option<&str>,
    messages: &mut Vec<AnalysisMessage>,
) -> Option<String> {
    if let Some(forced) = forced {
        if layer.field_names().iter().any(|f| f == forced) {
            return Some(forced.to_string());
        }
        messages.push(AnalysisMessage::advisory(
            Component::Decomposer,
            format!(
                "Zone field '{forced}' not found in layer '{}'; detecting the field instead.",
                layer.name()
            ),
        ));
    }
    find_field(layer.field_names(), &ZONE_FIELD_CANDIDATES, &[])
}

/// Intersect the parcel with the zoning layer and accumulate area per code.
pub fn decompose(
    parcel: &ParcelGeometry,
    zoning: Option<&dyn VectorLayer>,
    zone_code_field: Option<&str>,
    messages: &mut Vec<AnalysisMessage>,
) -> ZoneDecomposition {
    let parcel_area = parcel.area_m2();
    let Some(layer) = zoning else {
        messages.push(AnalysisMessage::advisory(
            Component::Decomposer,
            "Zoning layer not provided; zoning incidence cannot be computed.",
        ));
        return ZoneDecomposition::empty(parcel_area);
    };
    let Some(field) = resolve_field(layer, zone_code_field, messages) else {
        messages.push(AnalysisMessage::advisory(
            Component::Decomposer,
            format!(
                "Zoning layer '{}' has no recognizable zone-code field.",
                layer.name()
            ),
        ));
        return ZoneDecomposition::empty(parcel_area);
    };

    let features = layer.features();
    let index = FeatureIndex::build(features);
    let bounds = match parcel.polygon().bounding_rect() {
        Some(rect) => rect,
        None => return ZoneDecomposition::empty(parcel_area),
    };

    let mut areas: IndexMap<String, f64> = IndexMap::new();
    for idx in index.candidates(&bounds) {
        let feature = &features[idx];
        let Some(code) = feature.attribute_text(&field) else {
            continue;
        };
        match intersection_area(parcel.polygon(), &feature.geometry) {
            Some(area) => *areas.entry(code).or_insert(0.0) += area,
            None => {
                tracing::warn!(feature = idx, zone = %code, "zoning intersection failed");
                messages.push(AnalysisMessage::advisory(
                    Component::Decomposer,
                    format!("Zoning feature #{idx} ({code}) could not be intersected and was skipped."),
                ));
            }
        }
    }

    let decomposition = ZoneDecomposition::from_areas(areas, parcel_area, Some(field));
    tracing::debug!(
        zones = decomposition.incidences.len(),
        total_m2 = decomposition.total_area_m2,
        "zoning decomposed"
    );
    decomposition
}
