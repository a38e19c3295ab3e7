//! Spatial layer: layer access, parcel geometry and the geometric analyses.

pub mod boundary;
pub mod constraints;
pub mod decomposer;
pub mod geojson_io;
pub mod geometry;
pub mod index;
pub mod provider;
pub mod slope;
