//! Python bindings for the `_zoni_core` extension module.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::analysis::cache::ParameterCache;
use crate::analysis::{AnalysisConfig, AnalysisOrchestrator, CancellationToken};
use crate::errors::ZoniResult;
use crate::models::AnalysisRequest;
use crate::rules::categories;
use crate::rules::parameters;
use crate::rules::rulebook::Rulebook;
use crate::spatial::geojson_io::load_layer;
use crate::spatial::provider::{GridRaster, LayerRole, LayerSet};
use crate::spatial::slope;

// ---------------------------------------------------------------------------
// SlopeGrid
// ---------------------------------------------------------------------------

/// Slope raster in degrees, row-major from the north-west corner.
#[pyclass(frozen, get_all)]
#[derive(Clone, Debug)]
pub struct SlopeGrid {
    pub name: String,
    pub min_x: f64,
    pub max_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
    pub no_data: Option<f64>,
}

impl SlopeGrid {
    fn to_raster(&self) -> ZoniResult<GridRaster> {
        GridRaster::new(
            self.name.clone(),
            self.min_x,
            self.max_y,
            self.pixel_width,
            self.pixel_height,
            self.rows,
            self.cols,
            self.values.clone(),
            self.no_data,
        )
    }
}

#[pymethods]
impl SlopeGrid {
    #[new]
    #[pyo3(signature = (min_x, max_y, pixel_width, pixel_height, rows, cols, values, no_data=None, name="slope".to_string()))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        min_x: f64,
        max_y: f64,
        pixel_width: f64,
        pixel_height: f64,
        rows: usize,
        cols: usize,
        values: Vec<f64>,
        no_data: Option<f64>,
        name: String,
    ) -> PyResult<Self> {
        let grid = Self {
            name,
            min_x,
            max_y,
            pixel_width,
            pixel_height,
            rows,
            cols,
            values,
            no_data,
        };
        grid.to_raster()?;
        Ok(grid)
    }

    fn __repr__(&self) -> String {
        format!(
            "SlopeGrid(name={:?}, rows={}, cols={}, pixel_width={}, pixel_height={}, no_data={:?})",
            self.name, self.rows, self.cols, self.pixel_width, self.pixel_height, self.no_data,
        )
    }
}

// ---------------------------------------------------------------------------
// ZoningEngine
// ---------------------------------------------------------------------------

fn layer_set(layers: &HashMap<String, String>, slope: Option<GridRaster>) -> ZoniResult<LayerSet> {
    let mut set = LayerSet::new();
    let mut roles: Vec<(&String, &String)> = layers.iter().collect();
    roles.sort();
    for (role_name, path) in roles {
        let role = LayerRole::parse(role_name).ok_or_else(|| {
            crate::errors::ZoniError::MissingLayer(format!("unknown layer role '{role_name}'"))
        })?;
        set.insert_vector(role, load_layer(role.as_str(), Path::new(path))?);
    }
    if let Some(raster) = slope {
        set.insert_raster(LayerRole::SlopeRaster, raster);
    }
    Ok(set)
}

/// Analysis engine bound to one parameter table and rulebook.
#[pyclass(frozen)]
pub struct ZoningEngine {
    parameters_path: String,
    orchestrator: AnalysisOrchestrator,
}

#[pymethods]
impl ZoningEngine {
    #[new]
    #[pyo3(signature = (parameters_path, rulebook_path=None))]
    fn new(parameters_path: String, rulebook_path: Option<String>) -> PyResult<Self> {
        let (table, mode) = ParameterCache::global().get_or_load(Path::new(&parameters_path))?;
        tracing::debug!(path = %parameters_path, mode = mode.as_str(), "engine parameters");
        let rulebook = match rulebook_path {
            Some(path) => Rulebook::load(Path::new(&path))?,
            None => Rulebook::default(),
        };
        Ok(Self {
            parameters_path,
            orchestrator: AnalysisOrchestrator::new(
                Arc::new(rulebook),
                table,
                AnalysisConfig::from_env(),
            ),
        })
    }

    /// Analyze one parcel. `layers` maps role names (`zoning`, `roads`,
    /// `parcels`, ...) to GeoJSON files. Returns the result as JSON.
    #[pyo3(signature = (request_json, layers, slope_raster=None))]
    fn analyze(
        &self,
        py: Python<'_>,
        request_json: &str,
        layers: HashMap<String, String>,
        slope_raster: Option<SlopeGrid>,
    ) -> PyResult<String> {
        let request = AnalysisRequest::from_json_str(request_json)?;
        let raster = slope_raster.map(|grid| grid.to_raster()).transpose()?;
        let orchestrator = &self.orchestrator;
        let json = py.allow_threads(move || -> ZoniResult<String> {
            let provider = layer_set(&layers, raster)?;
            orchestrator
                .analyze(&provider, &request, &CancellationToken::new())?
                .to_json()
        })?;
        Ok(json)
    }

    #[getter]
    fn parameter_fingerprint(&self) -> String {
        self.orchestrator.resolver().parameters().fingerprint().to_string()
    }

    fn zone_codes(&self) -> Vec<String> {
        self.orchestrator
            .resolver()
            .parameters()
            .codes()
            .map(str::to_string)
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "ZoningEngine(parameters_path={:?}, zones={}, jurisdiction={:?})",
            self.parameters_path,
            self.orchestrator.resolver().parameters().len(),
            self.orchestrator.resolver().rulebook().jurisdiction,
        )
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

#[pyfunction]
pub fn classify_zone_code(code: &str) -> &'static str {
    categories::classify_zone_code(code).as_str()
}

#[pyfunction]
pub fn parse_decimal(text: &str) -> Option<f64> {
    parameters::parse_decimal(text)
}

/// `(band number 1-6, label, color)` for a slope in degrees.
#[pyfunction]
pub fn slope_band_for(degrees: f64) -> Option<(usize, &'static str, &'static str)> {
    slope::band_for(degrees).map(|band| (band.index() + 1, band.label(), band.color()))
}

#[pyfunction]
pub fn parameter_table_fingerprint(path: &str) -> PyResult<String> {
    let (table, _) = ParameterCache::global().get_or_load(Path::new(path))?;
    Ok(table.fingerprint().to_string())
}
