//! Criterion benchmarks for zoni-core.
//!
//! ## Benchmark groups
//!
//! 1. **rules**: zone-code lookup, decimal parsing, overlap resolution.
//! 2. **boundary**: perimeter classification against many roads and lots.
//! 3. **slope**: raster sampling at several window sizes.
//! 4. **pipeline**: a full single-parcel analysis.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/zoni-core/Cargo.toml
//! # Run only the slope group:
//! cargo bench --manifest-path crates/zoni-core/Cargo.toml -- slope
//! ```

use std::f64::consts::TAU;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geo::{polygon, LineString, Polygon};
use indexmap::IndexMap;
use serde_json::json;

use _zoni_core::analysis::{AnalysisConfig, AnalysisOrchestrator, CancellationToken};
use _zoni_core::models::{AnalysisRequest, BuildingScenario};
use _zoni_core::rules::categories::classify_zone_code;
use _zoni_core::rules::parameters::{parse_decimal, ParameterTable, ZoneParameters};
use _zoni_core::rules::resolver::ZoneOverlapResolver;
use _zoni_core::rules::rulebook::Rulebook;
use _zoni_core::spatial::boundary;
use _zoni_core::spatial::decomposer::ZoneDecomposition;
use _zoni_core::spatial::geometry::ParcelGeometry;
use _zoni_core::spatial::provider::{
    Attributes, Feature, FeatureLayer, GridRaster, LayerRole, LayerSet, VectorLayer,
};
use _zoni_core::spatial::slope;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
    polygon![
        (x: x0, y: y0),
        (x: x1, y: y0),
        (x: x1, y: y1),
        (x: x0, y: y1),
        (x: x0, y: y0),
    ]
}

/// Regular polygon with `n` vertices around `(cx, cy)`.
fn round_parcel(cx: f64, cy: f64, radius: f64, n: usize) -> Polygon<f64> {
    let mut coords: Vec<(f64, f64)> = (0..n)
        .map(|i| {
            let angle = TAU * i as f64 / n as f64;
            (cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect();
    coords.push(coords[0]);
    Polygon::new(LineString::from(coords), vec![])
}

fn attrs(key: &str, value: serde_json::Value) -> Attributes {
    let mut a = Attributes::new();
    a.insert(key.to_string(), value);
    a
}

/// A street grid: horizontal and vertical roads every `spacing` metres.
fn road_grid(extent: f64, spacing: f64) -> FeatureLayer {
    let mut features = Vec::new();
    let mut offset = -extent;
    let mut i = 0;
    while offset <= extent {
        features.push(Feature::new(
            LineString::from(vec![(-extent, offset), (extent, offset)]),
            attrs("NOME", json!(format!("Rua {i}"))),
        ));
        features.push(Feature::new(
            LineString::from(vec![(offset, -extent), (offset, extent)]),
            attrs("NOME", json!(format!("Avenida {i}"))),
        ));
        offset += spacing;
        i += 1;
    }
    FeatureLayer::new("roads", features)
}

fn lot_grid(extent: f64, size: f64) -> FeatureLayer {
    let mut features = Vec::new();
    let mut x = -extent;
    while x < extent {
        let mut y = -extent;
        while y < extent {
            features.push(Feature::new(
                rect(x, y, x + size, y + size),
                attrs("PROPRIETARIO", json!(format!("lot {x} {y}"))),
            ));
            y += size;
        }
        x += size;
    }
    FeatureLayer::new("lots", features)
}

fn slope_grid(rows: usize, cols: usize) -> GridRaster {
    let values: Vec<f64> = (0..rows * cols).map(|i| (i % 90) as f64).collect();
    GridRaster::new("slope", 0.0, rows as f64, 1.0, 1.0, rows, cols, values, None)
        .expect("valid grid")
}

// ---------------------------------------------------------------------------
// 1. Rules
// ---------------------------------------------------------------------------

fn bench_rules(c: &mut Criterion) {
    let mut group = c.benchmark_group("rules");

    let codes = ["ZE1", "EU1", "SEMIEIXO", "MUQ2", "MUPA1", "MEU", "ZR1", "EIXOORLA"];
    group.bench_function("classify_zone_code", |b| {
        b.iter(|| {
            for code in codes {
                black_box(classify_zone_code(black_box(code)));
            }
        })
    });

    group.bench_function("parse_decimal", |b| {
        b.iter(|| {
            black_box(parse_decimal(black_box("1.234,5")));
            black_box(parse_decimal(black_box("0,6")));
            black_box(parse_decimal(black_box("12.500")));
        })
    });

    let resolver = ZoneOverlapResolver::new(
        Arc::new(Rulebook::default()),
        Arc::new(ParameterTable::from_parameters(vec![(
            "MUQ2".to_string(),
            ZoneParameters {
                ca_max: Some(1.0),
                ..ZoneParameters::default()
            },
        )])),
    );
    let areas: IndexMap<String, f64> = [("MUQ2", 220.0), ("EU1", 180.0), ("MRPA", 60.0), ("ZR1", 40.0)]
        .into_iter()
        .map(|(c, a)| (c.to_string(), a))
        .collect();
    let decomposition = ZoneDecomposition::from_areas(areas, 500.0, None);
    let notes = IndexMap::new();
    group.bench_function("resolve", |b| {
        b.iter(|| {
            let mut messages = Vec::new();
            black_box(resolver.resolve(&decomposition, None, &notes, &mut messages))
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Boundary
// ---------------------------------------------------------------------------

fn bench_boundary(c: &mut Criterion) {
    let mut group = c.benchmark_group("boundary");
    let roads = road_grid(2000.0, 50.0);
    let lots = lot_grid(500.0, 25.0);
    let config = AnalysisConfig::default();

    for vertices in [4usize, 64, 512] {
        let parcel = ParcelGeometry::from_polygon(round_parcel(12.0, 12.0, 11.0, vertices))
            .expect("valid parcel");
        group.bench_with_input(BenchmarkId::new("classify", vertices), &parcel, |b, parcel| {
            b.iter(|| {
                let mut messages = Vec::new();
                black_box(boundary::classify(
                    parcel,
                    Some(&lots as &dyn VectorLayer),
                    Some(&roads as &dyn VectorLayer),
                    &config,
                    &mut messages,
                ))
            })
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Slope
// ---------------------------------------------------------------------------

fn bench_slope(c: &mut Criterion) {
    let mut group = c.benchmark_group("slope");
    group.sample_size(20);

    for side in [100usize, 500, 2000] {
        let raster = slope_grid(side, side);
        let s = side as f64;
        let parcel = ParcelGeometry::from_polygon(round_parcel(s / 2.0, s / 2.0, s / 2.5, 128))
            .expect("valid parcel");
        group.bench_with_input(BenchmarkId::new("classify", side), &raster, |b, raster| {
            b.iter(|| {
                let mut messages = Vec::new();
                black_box(slope::classify_outcome(
                    &parcel,
                    Some(raster),
                    Some(parcel.area_m2()),
                    0.2,
                    &CancellationToken::new(),
                    &mut messages,
                ))
            })
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 4. Pipeline
// ---------------------------------------------------------------------------

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    let zoning = FeatureLayer::new(
        "zoning",
        vec![
            Feature::new(rect(-500.0, -500.0, 12.0, 500.0), attrs("ZONA", json!("MUQ2"))),
            Feature::new(rect(12.0, -500.0, 500.0, 500.0), attrs("ZONA", json!("EU1"))),
        ],
    );
    let provider = LayerSet::new()
        .with_vector(LayerRole::Zoning, zoning)
        .with_vector(LayerRole::Roads, road_grid(2000.0, 50.0))
        .with_vector(LayerRole::Parcels, lot_grid(500.0, 25.0))
        .with_raster(LayerRole::SlopeRaster, slope_grid(500, 500));
    let engine = AnalysisOrchestrator::new(
        Arc::new(Rulebook::default()),
        Arc::new(ParameterTable::from_parameters(Vec::new())),
        AnalysisConfig::default(),
    );
    let request = AnalysisRequest::new(
        vec![rect(1.0, 1.0, 24.0, 24.0)],
        BuildingScenario {
            built_area_m2: Some(600.0),
            ..BuildingScenario::with_lot_area(529.0)
        },
    );

    group.bench_function("analyze", |b| {
        b.iter(|| black_box(engine.analyze(&provider, &request, &CancellationToken::new())))
    });

    group.finish();
}

criterion_group!(benches, bench_rules, bench_boundary, bench_slope, bench_pipeline);
criterion_main!(benches);
