//! Zôni core library: parcel regulatory analysis.
//!
//! Given one parcel (possibly several contiguous lots) and a set of GIS layers,
//! this crate classifies every boundary segment as frontage or divide,
//! decomposes the parcel by zoning incidence, resolves overlapping zones into a
//! reference zone, classifies terrain slope, screens environmental
//! constraints and checks a building scenario against the zone parameters.
//! With the `python` feature it builds the `_zoni_core` extension module.

pub mod analysis;
pub mod errors;
pub mod models;
pub mod rules;
pub mod spatial;

#[cfg(feature = "python")]
mod python;

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::wrap_pyfunction;

// ---------------------------------------------------------------------------
// Top-level Python module: _zoni_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _zoni_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // -- Constants ----------------------------------------------------------
    m.add("RESULT_SCHEMA_VERSION", models::RESULT_SCHEMA_VERSION)?;
    m.add(
        "DEFAULT_MAX_SEARCH_DISTANCE_M",
        analysis::guards::DEFAULT_MAX_SEARCH_DISTANCE_M,
    )?;
    m.add("DEFAULT_PROBE_OFFSET_M", analysis::guards::DEFAULT_PROBE_OFFSET_M)?;
    m.add("MAX_RASTER_PIXELS", analysis::guards::MAX_RASTER_PIXELS)?;

    // -- Engine -------------------------------------------------------------
    m.add_class::<python::ZoningEngine>()?;
    m.add_class::<python::SlopeGrid>()?;

    // -- Helpers ------------------------------------------------------------
    m.add_function(wrap_pyfunction!(python::classify_zone_code, m)?)?;
    m.add_function(wrap_pyfunction!(python::parse_decimal, m)?)?;
    m.add_function(wrap_pyfunction!(python::slope_band_for, m)?)?;
    m.add_function(wrap_pyfunction!(python::parameter_table_fingerprint, m)?)?;

    Ok(())
}
