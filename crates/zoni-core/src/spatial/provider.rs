//! Layer capability interface consumed by the analysis core.
//!
//! The host owns the project layers and hands the core a per-request
//! [`GeometryProvider`]; nothing here is global. `LayerSet` is the in-memory
//! provider used by the Python bindings, the tests and the benches.

use geo::{Geometry, Rect};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{ZoniError, ZoniResult};

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Semantic role of a layer within one analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    Parcels,
    Zoning,
    Roads,
    SlopeRaster,
    FloodRisk,
    LandslideRisk,
    AppBuffer,
    Mangrove,
}

impl LayerRole {
    pub const ALL: [LayerRole; 8] = [
        LayerRole::Parcels,
        LayerRole::Zoning,
        LayerRole::Roads,
        LayerRole::SlopeRaster,
        LayerRole::FloodRisk,
        LayerRole::LandslideRisk,
        LayerRole::AppBuffer,
        LayerRole::Mangrove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerRole::Parcels => "parcels",
            LayerRole::Zoning => "zoning",
            LayerRole::Roads => "roads",
            LayerRole::SlopeRaster => "slope_raster",
            LayerRole::FloodRisk => "flood_risk",
            LayerRole::LandslideRisk => "landslide_risk",
            LayerRole::AppBuffer => "app_buffer",
            LayerRole::Mangrove => "mangrove",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let wanted = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|role| role.as_str() == wanted)
    }
}

// ---------------------------------------------------------------------------
// Vector layers
// ---------------------------------------------------------------------------

/// Attribute values of one feature, in source field order.
pub type Attributes = IndexMap<String, serde_json::Value>;

/// One vector feature: geometry plus attributes.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>, attributes: Attributes) -> Self {
        Self {
            geometry: geometry.into(),
            attributes,
        }
    }

    /// Attribute rendered as trimmed text; null and blank values are `None`.
    pub fn attribute_text(&self, field: &str) -> Option<String> {
        let text = match self.attributes.get(field)? {
            serde_json::Value::Null => return None,
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

pub trait VectorLayer: Send + Sync {
    fn name(&self) -> &str;
    fn field_names(&self) -> &[String];
    fn features(&self) -> &[Feature];
}

/// In-memory vector layer.
#[derive(Debug, Clone, Default)]
pub struct FeatureLayer {
    name: String,
    fields: Vec<String>,
    features: Vec<Feature>,
}

impl FeatureLayer {
    /// Build a layer whose field list is the union of the features'
    /// attribute keys, in first-seen order.
    pub fn new(name: impl Into<String>, features: Vec<Feature>) -> Self {
        let mut fields: Vec<String> = Vec::new();
        for feature in &features {
            for key in feature.attributes.keys() {
                if !fields.iter().any(|f| f == key) {
                    fields.push(key.clone());
                }
            }
        }
        Self {
            name: name.into(),
            fields,
            features,
        }
    }

    pub fn with_fields(name: impl Into<String>, fields: Vec<String>, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            fields,
            features,
        }
    }
}

impl VectorLayer for FeatureLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_names(&self) -> &[String] {
        &self.fields
    }

    fn features(&self) -> &[Feature] {
        &self.features
    }
}

/// Pick an attribute field: exact candidates first (in priority order), then
/// the first field whose lowercase name contains one of `fragments`.
pub fn find_field(fields: &[String], candidates: &[&str], fragments: &[&str]) -> Option<String> {
    for candidate in candidates {
        if fields.iter().any(|f| f == candidate) {
            return Some((*candidate).to_string());
        }
    }
    fields
        .iter()
        .find(|f| {
            let lower = f.to_lowercase();
            fragments.iter().any(|frag| lower.contains(frag))
        })
        .cloned()
}

// ---------------------------------------------------------------------------
// Raster layers
// ---------------------------------------------------------------------------

/// A rectangular window of raster values, row-major.
#[derive(Debug, Clone)]
pub struct RasterBlock {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
}

impl RasterBlock {
    /// `None` when the block holds fewer values than `rows x cols`.
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        if col >= self.cols {
            return None;
        }
        self.values.get(row * self.cols + col).copied()
    }
}

/// Single-band raster with a north-up pixel lattice.
pub trait RasterLayer: Send + Sync {
    fn name(&self) -> &str;

    fn is_valid(&self) -> bool {
        true
    }

    /// Pixel size `(x, y)` in map units, both positive.
    fn resolution(&self) -> (f64, f64);

    fn extent(&self) -> Rect<f64>;

    fn no_data(&self) -> Option<f64>;

    /// `(rows, cols)` of the full raster.
    fn dimensions(&self) -> (usize, usize);

    /// Read `rows x cols` pixels starting at `(first_row, first_col)`, row 0
    /// being the northernmost row. `None` when the window is out of range or
    /// the source cannot be read.
    fn read_block(
        &self,
        first_row: usize,
        first_col: usize,
        rows: usize,
        cols: usize,
    ) -> Option<RasterBlock>;
}

/// In-memory raster grid.
#[derive(Debug, Clone)]
pub struct GridRaster {
    name: String,
    min_x: f64,
    max_y: f64,
    pixel_width: f64,
    pixel_height: f64,
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    no_data: Option<f64>,
}

impl GridRaster {
    /// `values` are row-major, starting at the north-west corner
    /// `(min_x, max_y)`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        min_x: f64,
        max_y: f64,
        pixel_width: f64,
        pixel_height: f64,
        rows: usize,
        cols: usize,
        values: Vec<f64>,
        no_data: Option<f64>,
    ) -> ZoniResult<Self> {
        let name = name.into();
        if !(pixel_width > 0.0 && pixel_height > 0.0) {
            return Err(ZoniError::RasterUnavailable(format!(
                "raster '{name}' has a non-positive pixel size"
            )));
        }
        if values.len() != rows * cols {
            return Err(ZoniError::RasterUnavailable(format!(
                "raster '{name}' expects {} values, got {}",
                rows * cols,
                values.len()
            )));
        }
        Ok(Self {
            name,
            min_x,
            max_y,
            pixel_width,
            pixel_height,
            rows,
            cols,
            values,
            no_data,
        })
    }
}

impl RasterLayer for GridRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_valid(&self) -> bool {
        self.rows > 0 && self.cols > 0
    }

    fn resolution(&self) -> (f64, f64) {
        (self.pixel_width, self.pixel_height)
    }

    fn extent(&self) -> Rect<f64> {
        Rect::new(
            geo::coord! { x: self.min_x, y: self.max_y - self.rows as f64 * self.pixel_height },
            geo::coord! { x: self.min_x + self.cols as f64 * self.pixel_width, y: self.max_y },
        )
    }

    fn no_data(&self) -> Option<f64> {
        self.no_data
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn read_block(
        &self,
        first_row: usize,
        first_col: usize,
        rows: usize,
        cols: usize,
    ) -> Option<RasterBlock> {
        if first_row + rows > self.rows || first_col + cols > self.cols {
            return None;
        }
        let mut values = Vec::with_capacity(rows * cols);
        for row in first_row..first_row + rows {
            let start = row * self.cols + first_col;
            values.extend_from_slice(&self.values[start..start + cols]);
        }
        Some(RasterBlock { rows, cols, values })
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Per-request capability: role name → layer.
pub trait GeometryProvider: Sync {
    fn vector_layer(&self, role: LayerRole) -> Option<&dyn VectorLayer>;
    fn raster_layer(&self, role: LayerRole) -> Option<&dyn RasterLayer>;
}

/// In-memory provider keyed by role.
#[derive(Default)]
pub struct LayerSet {
    vectors: IndexMap<LayerRole, Box<dyn VectorLayer>>,
    rasters: IndexMap<LayerRole, Box<dyn RasterLayer>>,
}

impl LayerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_vector(&mut self, role: LayerRole, layer: impl VectorLayer + 'static) {
        self.vectors.insert(role, Box::new(layer));
    }

    pub fn insert_raster(&mut self, role: LayerRole, layer: impl RasterLayer + 'static) {
        self.rasters.insert(role, Box::new(layer));
    }

    pub fn with_vector(mut self, role: LayerRole, layer: impl VectorLayer + 'static) -> Self {
        self.insert_vector(role, layer);
        self
    }

    pub fn with_raster(mut self, role: LayerRole, layer: impl RasterLayer + 'static) -> Self {
        self.insert_raster(role, layer);
        self
    }

    pub fn roles(&self) -> Vec<LayerRole> {
        self.vectors.keys().chain(self.rasters.keys()).copied().collect()
    }
}

impl GeometryProvider for LayerSet {
    fn vector_layer(&self, role: LayerRole) -> Option<&dyn VectorLayer> {
        self.vectors.get(&role).map(|layer| layer.as_ref())
    }

    fn raster_layer(&self, role: LayerRole) -> Option<&dyn RasterLayer> {
        self.rasters.get(&role).map(|layer| layer.as_ref())
    }
}
