//! End-to-end analyses over in-memory and GeoJSON layers.

use std::sync::Arc;

use geo::{polygon, LineString, Polygon};
use serde_json::json;

use _zoni_core::analysis::{AnalysisConfig, AnalysisOrchestrator, CancellationToken};
use _zoni_core::errors::ZoniError;
use _zoni_core::models::{AnalysisRequest, BuildingScenario, MessageLevel};
use _zoni_core::rules::compliance::ComplianceOutcome;
use _zoni_core::rules::parameters::ParameterTable;
use _zoni_core::rules::resolver::{ReferenceBasis, ZoneOrigin};
use _zoni_core::rules::rulebook::Rulebook;
use _zoni_core::spatial::boundary::SegmentKind;
use _zoni_core::spatial::geojson_io::load_layer;
use _zoni_core::spatial::provider::{Attributes, Feature, FeatureLayer, GridRaster, LayerRole, LayerSet};
use _zoni_core::spatial::slope::{SlopeBand, SlopeOutcome};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PARAMETERS: &str = r#"{
    "MUQ2": {"indices": {"CA_min": "0,1", "CA_bas": "1,0", "CA_max": "1,0", "Tocup": "60",
                         "Tperm": "0,2", "Npav_max": "4", "Gab_max": "14,5"}},
    "MUQ3": {"indices": {"CA_max": "2,0", "Tocup": "0,7"}},
    "ZE1": {"indices": {"CA_max": "0,5"}},
    "EU1": {"indices": {"CA_max": "3,0"}}
}"#;

/// Counter-clockwise rectangle starting at its south-west corner.
fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
    polygon![
        (x: x0, y: y0),
        (x: x1, y: y0),
        (x: x1, y: y1),
        (x: x0, y: y1),
        (x: x0, y: y0),
    ]
}

fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attributes {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn zoning(zones: &[(&str, Polygon<f64>)]) -> FeatureLayer {
    FeatureLayer::new(
        "zoning",
        zones
            .iter()
            .map(|(code, poly)| Feature::new(poly.clone(), attrs(&[("ZONA", json!(code))])))
            .collect(),
    )
}

fn engine() -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(
        Arc::new(Rulebook::default()),
        Arc::new(ParameterTable::from_json_str(PARAMETERS).unwrap()),
        AnalysisConfig::default(),
    )
}

fn lot_500(scenario: BuildingScenario) -> AnalysisRequest {
    AnalysisRequest::new(vec![rect(0.0, 0.0, 20.0, 25.0)], scenario)
}

// ---------------------------------------------------------------------------
// Resolution scenarios
// ---------------------------------------------------------------------------

#[test]
fn single_macro_zone_is_reference() {
    let provider = LayerSet::new().with_vector(
        LayerRole::Zoning,
        zoning(&[("MUQ2", rect(-50.0, -50.0, 50.0, 50.0))]),
    );
    let result = engine()
        .analyze(
            &provider,
            &lot_500(BuildingScenario::with_lot_area(500.0)),
            &CancellationToken::new(),
        )
        .unwrap();

    let decomposition = result.decomposition();
    assert_eq!(decomposition.incidences.len(), 1);
    assert!((decomposition.incidences[0].area_m2 - 500.0).abs() < 1e-6);
    assert!((decomposition.incidences[0].percent - 100.0).abs() < 1e-6);

    let zoning = result.zoning();
    assert_eq!(zoning.reference_zone.as_deref(), Some("MUQ2"));
    assert_eq!(zoning.rule_label, "single macro zone");
    assert_eq!(zoning.reference_basis, ReferenceBasis::Rule);
    assert!(result.compliance().is_evaluated());
}

#[test]
fn equal_special_zones_pick_smallest_code() {
    let provider = LayerSet::new().with_vector(
        LayerRole::Zoning,
        zoning(&[
            ("ZE2", rect(-10.0, 15.0, 30.0, 40.0)),
            ("ZE1", rect(-10.0, -10.0, 30.0, 15.0)),
        ]),
    );
    let request = AnalysisRequest::new(
        vec![rect(0.0, 0.0, 20.0, 30.0)],
        BuildingScenario::with_lot_area(600.0),
    );
    let result = engine()
        .analyze(&provider, &request, &CancellationToken::new())
        .unwrap();
    let zoning = result.zoning();
    assert!((result.decomposition().area_of("ZE1").unwrap() - 300.0).abs() < 1e-6);
    assert!((result.decomposition().area_of("ZE2").unwrap() - 300.0).abs() < 1e-6);
    assert_eq!(zoning.reference_zone.as_deref(), Some("ZE1"));
    assert_eq!(zoning.rule_label, "special predominates");
}

#[test]
fn far_violation_cites_realized_and_limit() {
    let provider = LayerSet::new().with_vector(
        LayerRole::Zoning,
        zoning(&[("MUQ2", rect(-50.0, -50.0, 50.0, 50.0))]),
    );
    let scenario = BuildingScenario {
        built_area_m2: Some(600.0),
        ..BuildingScenario::with_lot_area(500.0)
    };
    let result = engine()
        .analyze(&provider, &lot_500(scenario), &CancellationToken::new())
        .unwrap();
    let ComplianceOutcome::Evaluated(compliance) = result.compliance() else {
        panic!("compliance should be evaluated");
    };
    assert!(!compliance.is_compliant);
    assert_eq!(compliance.violations.len(), 1);
    assert!(compliance.violations[0].contains("1.20 vs 1.00"));
    assert_eq!(compliance.parameters.ca_max, Some(1.0));
}

#[test]
fn non_contiguous_lots_are_rejected() {
    let request = AnalysisRequest::new(
        vec![rect(0.0, 0.0, 10.0, 10.0), rect(50.0, 0.0, 60.0, 10.0)],
        BuildingScenario::with_lot_area(200.0),
    );
    let err = engine()
        .analyze(&LayerSet::new(), &request, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, ZoniError::InvalidParcelGeometry(_)));
    assert!(err.is_fatal());
}

#[test]
fn contiguous_lots_are_dissolved() {
    let provider = LayerSet::new().with_vector(
        LayerRole::Zoning,
        zoning(&[("MUQ2", rect(-50.0, -50.0, 50.0, 50.0))]),
    );
    let request = AnalysisRequest::new(
        vec![rect(0.0, 0.0, 10.0, 25.0), rect(10.0, 0.0, 20.0, 25.0)],
        BuildingScenario::with_lot_area(500.0),
    );
    let result = engine()
        .analyze(&provider, &request, &CancellationToken::new())
        .unwrap();
    assert_eq!(result.parcel().part_count, 2);
    assert!((result.parcel().area_m2 - 500.0).abs() < 1e-6);
    assert!((result.boundary().perimeter_m - 90.0).abs() < 1e-6);
}

// ---------------------------------------------------------------------------
// Slope
// ---------------------------------------------------------------------------

#[test]
fn all_nodata_raster_is_unavailable() {
    let raster = GridRaster::new("slope", 0.0, 25.0, 1.0, 1.0, 25, 20, vec![-9999.0; 500], Some(-9999.0))
        .unwrap();
    let provider = LayerSet::new()
        .with_vector(LayerRole::Zoning, zoning(&[("MUQ2", rect(-50.0, -50.0, 50.0, 50.0))]))
        .with_raster(LayerRole::SlopeRaster, raster);
    let result = engine()
        .analyze(
            &provider,
            &lot_500(BuildingScenario::with_lot_area(500.0)),
            &CancellationToken::new(),
        )
        .unwrap();
    assert!(matches!(result.slope(), SlopeOutcome::Unavailable { .. }));
    assert!(result
        .messages_at(MessageLevel::Advisory)
        .any(|m| m.text.starts_with("Slope analysis unavailable")));
}

#[test]
fn slope_bands_partition_sampled_area() {
    // Five northern rows at 50 degrees, the rest at 5 degrees.
    let mut values = vec![50.0; 100];
    values.extend(vec![5.0; 400]);
    let raster = GridRaster::new("slope", 0.0, 25.0, 1.0, 1.0, 25, 20, values, None).unwrap();
    let provider = LayerSet::new().with_raster(LayerRole::SlopeRaster, raster);
    let result = engine()
        .analyze(
            &provider,
            &lot_500(BuildingScenario::with_lot_area(500.0)),
            &CancellationToken::new(),
        )
        .unwrap();
    let slope = result.slope().result().unwrap();
    let sum: f64 = slope.bands.iter().map(|b| b.area_m2).sum();
    assert!((sum - slope.total_area_m2).abs() < 1e-9);
    assert!((slope.total_area_m2 - 500.0).abs() < 1e-9);
    assert!((slope.band(SlopeBand::Protected).area_m2 - 100.0).abs() < 1e-9);
    assert!((slope.band(SlopeBand::Gentle).area_m2 - 400.0).abs() < 1e-9);
    assert!(slope.has_protected_area);
    assert!((slope.protected_percent - 20.0).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

#[test]
fn frontage_on_note_street_infers_override() {
    let roads = FeatureLayer::new(
        "roads",
        vec![Feature::new(
            LineString::from(vec![(-10.0, -6.0), (30.0, -6.0)]),
            attrs(&[("NOME", json!("Rua Lúcio Joaquim Mendes"))]),
        )],
    );
    let lots = FeatureLayer::new(
        "lots",
        vec![
            Feature::new(rect(0.0, 0.0, 20.0, 25.0), attrs(&[("PROPRIETARIO", json!("Self"))])),
            Feature::new(rect(20.0, 0.0, 40.0, 25.0), attrs(&[("PROPRIETARIO", json!("Maria"))])),
        ],
    );
    let flood = FeatureLayer::new(
        "flood",
        vec![Feature::new(rect(15.0, 20.0, 30.0, 30.0), attrs(&[("CLASSE", json!("Media"))]))],
    );
    let provider = LayerSet::new()
        .with_vector(LayerRole::Zoning, zoning(&[("MUQ2", rect(-50.0, -50.0, 50.0, 50.0))]))
        .with_vector(LayerRole::Roads, roads)
        .with_vector(LayerRole::Parcels, lots)
        .with_vector(LayerRole::FloodRisk, flood);
    let scenario = BuildingScenario {
        built_area_m2: Some(600.0),
        footprint_area_m2: Some(300.0),
        ..BuildingScenario::with_lot_area(500.0)
    };
    let result = engine()
        .analyze(&provider, &lot_500(scenario), &CancellationToken::new())
        .unwrap();

    let boundary = result.boundary();
    assert_eq!(boundary.segments.len(), 4);
    assert_eq!(
        boundary.segments[0].kind,
        SegmentKind::Frontage {
            street_name: "Rua Lúcio Joaquim Mendes".to_string()
        }
    );
    assert!((boundary.divide_by_neighbor["Maria"] - 25.0).abs() < 1e-9);
    let total: f64 = boundary.segments.iter().map(|s| s.length_m).sum();
    assert!((total - boundary.perimeter_m).abs() < 1e-9);

    let zoning = result.zoning();
    assert_eq!(zoning.active_notes, vec!["37".to_string()]);
    assert_eq!(zoning.reference_zone.as_deref(), Some("MUQ3"));
    assert_eq!(
        zoning.application("MUQ3").unwrap().origin,
        ZoneOrigin::Note {
            note_id: "37".to_string()
        }
    );

    // MUQ3 allows FAR 2.0 and 70% occupancy.
    let compliance = result.compliance().result().unwrap();
    assert_eq!(compliance.zone, "MUQ3");
    assert!(compliance.is_compliant, "{:?}", compliance.violations);

    let constraints = result.constraints();
    assert_eq!(constraints.flood.as_ref().unwrap().class.as_deref(), Some("Media"));
    assert!(!constraints.in_protected_area());
}

#[test]
fn geojson_layers_and_json_request() {
    let dir = tempfile::tempdir().unwrap();
    let zoning_path = dir.path().join("zoning.geojson");
    std::fs::write(
        &zoning_path,
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"Zoneamento": "EU1"},
                "geometry": {"type": "Polygon",
                             "coordinates": [[[-5, -5], [25, -5], [25, 10], [-5, 10], [-5, -5]]]}
            }, {
                "type": "Feature",
                "properties": {"Zoneamento": "MUQ2"},
                "geometry": {"type": "Polygon",
                             "coordinates": [[[-5, 10], [25, 10], [25, 30], [-5, 30], [-5, 10]]]}
            }]
        })
        .to_string(),
    )
    .unwrap();

    let request = AnalysisRequest::from_json_str(
        &json!({
            "parcel_geometries": [
                {"type": "Polygon", "coordinates": [[[0, 0], [20, 0], [20, 25], [0, 25], [0, 0]]]}
            ],
            "scenario": {"area_lot_m2": 500.0, "built_area_m2": 1000.0, "story_count": 3},
            "manual_notes": {}
        })
        .to_string(),
    )
    .unwrap();

    let provider = LayerSet::new()
        .with_vector(LayerRole::Zoning, load_layer("zoning", &zoning_path).unwrap());
    let result = engine()
        .analyze(&provider, &request, &CancellationToken::new())
        .unwrap();

    assert_eq!(result.decomposition().zone_field.as_deref(), Some("Zoneamento"));
    assert!((result.decomposition().area_of("EU1").unwrap() - 200.0).abs() < 1e-6);
    assert!((result.decomposition().area_of("MUQ2").unwrap() - 300.0).abs() < 1e-6);
    assert_eq!(result.zoning().rule_label, "axis over macro");
    assert_eq!(result.zoning().reference_zone.as_deref(), Some("EU1"));
    assert!(result.compliance().result().unwrap().is_compliant);

    let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(value["zoning"]["reference_zone"], "EU1");
    assert_eq!(value["compliance"]["status"], "evaluated");
    assert_eq!(value["compliance"]["computed_ratios"]["floor_area_ratio"], 2.0);
}
