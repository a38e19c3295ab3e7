//! Shared typed models used across the spatial, rules and analysis layers.

use geo::Polygon;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{ZoniError, ZoniResult};

// ---------------------------------------------------------------------------
// Contract constants
// ---------------------------------------------------------------------------

/// Version of the serialised `AnalysisResult` layout consumed by report
/// renderers.
pub const RESULT_SCHEMA_VERSION: i64 = 1;

// ---------------------------------------------------------------------------
// 1. BuildingScenario
// ---------------------------------------------------------------------------

/// Proposed building figures for a parcel. Only `area_lot_m2` is mandatory;
/// every omitted figure skips the checks that need it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingScenario {
    pub area_lot_m2: f64,
    #[serde(default)]
    pub built_area_m2: Option<f64>,
    #[serde(default)]
    pub footprint_area_m2: Option<f64>,
    #[serde(default)]
    pub permeable_area_m2: Option<f64>,
    #[serde(default)]
    pub max_height_m: Option<f64>,
    #[serde(default)]
    pub story_count: Option<u32>,
}

impl BuildingScenario {
    pub fn with_lot_area(area_lot_m2: f64) -> Self {
        Self {
            area_lot_m2,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// 2. AnalysisRequest
// ---------------------------------------------------------------------------

/// One analysis invocation: the parcel parts to dissolve, the scenario and
/// the manual override flags keyed by note id (`"10"`, `"37"`, ...).
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub parcel_geometries: Vec<Polygon<f64>>,
    pub scenario: BuildingScenario,
    pub manual_notes: IndexMap<String, bool>,
}

impl AnalysisRequest {
    pub fn new(parcel_geometries: Vec<Polygon<f64>>, scenario: BuildingScenario) -> Self {
        Self {
            parcel_geometries,
            scenario,
            manual_notes: IndexMap::new(),
        }
    }

    pub fn with_note(mut self, note_id: impl Into<String>, active: bool) -> Self {
        self.manual_notes.insert(note_id.into(), active);
        self
    }

    /// Note ids whose manual flag is set, in insertion order.
    pub fn active_manual_notes(&self) -> Vec<&str> {
        self.manual_notes
            .iter()
            .filter(|(_, active)| **active)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Parse the JSON request form, where `parcel_geometries` carries GeoJSON
    /// geometry (or feature) objects.
    pub fn from_json_str(text: &str) -> ZoniResult<Self> {
        #[derive(Deserialize)]
        struct Payload {
            parcel_geometries: Vec<serde_json::Value>,
            scenario: BuildingScenario,
            #[serde(default)]
            manual_notes: IndexMap<String, bool>,
        }

        let payload: Payload = serde_json::from_str(text)?;
        let mut parcel_geometries = Vec::new();
        for (idx, value) in payload.parcel_geometries.iter().enumerate() {
            let polygons = crate::spatial::geojson_io::polygons_from_json(value)?;
            if polygons.is_empty() {
                return Err(ZoniError::GeoJson(format!(
                    "parcel geometry #{idx} contains no polygon"
                )));
            }
            parcel_geometries.extend(polygons);
        }
        Ok(Self {
            parcel_geometries,
            scenario: payload.scenario,
            manual_notes: payload.manual_notes,
        })
    }
}

// ---------------------------------------------------------------------------
// 3. Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    Advisory,
    Error,
}

/// Component that produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Parcel,
    Boundary,
    Decomposer,
    Resolver,
    Slope,
    Constraints,
    Compliance,
    Orchestrator,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Parcel => "parcel",
            Component::Boundary => "boundary",
            Component::Decomposer => "decomposer",
            Component::Resolver => "resolver",
            Component::Slope => "slope",
            Component::Constraints => "constraints",
            Component::Compliance => "compliance",
            Component::Orchestrator => "orchestrator",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMessage {
    pub level: MessageLevel,
    pub component: Component,
    pub text: String,
}

impl AnalysisMessage {
    pub fn info(component: Component, text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            component,
            text: text.into(),
        }
    }

    pub fn advisory(component: Component, text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Advisory,
            component,
            text: text.into(),
        }
    }

    pub fn error(component: Component, text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            component,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// 4. ParcelSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelSummary {
    pub part_count: usize,
    pub area_m2: f64,
    pub perimeter_m: f64,
    pub repair_stage: crate::spatial::geometry::RepairStage,
    /// `[min_x, min_y, max_x, max_y]`
    pub bounds: [f64; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_json_reads_geojson_parts() {
        let text = r#"{
            "parcel_geometries": [
                {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Polygon", "coordinates": [[[10,0],[20,0],[20,10],[10,10],[10,0]]]}}
            ],
            "scenario": {"area_lot_m2": 200.0, "built_area_m2": 150.0},
            "manual_notes": {"10": true, "37": false}
        }"#;
        let request = AnalysisRequest::from_json_str(text).unwrap();
        assert_eq!(request.parcel_geometries.len(), 2);
        assert_eq!(request.scenario.built_area_m2, Some(150.0));
        assert_eq!(request.scenario.story_count, None);
        assert_eq!(request.active_manual_notes(), vec!["10"]);
    }

    #[test]
    fn test_request_rejects_geometry_without_polygons() {
        let text = r#"{
            "parcel_geometries": [{"type": "Point", "coordinates": [0, 0]}],
            "scenario": {"area_lot_m2": 10.0}
        }"#;
        let err = AnalysisRequest::from_json_str(text).unwrap_err();
        assert!(matches!(err, ZoniError::GeoJson(_)));
    }

    #[test]
    fn test_message_levels_serialize_snake_case() {
        let msg = AnalysisMessage::advisory(Component::Slope, "x");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["level"], "advisory");
        assert_eq!(json["component"], "slope");
        assert!(MessageLevel::Info < MessageLevel::Error);
    }
}
