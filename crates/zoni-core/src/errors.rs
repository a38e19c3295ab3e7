//! Error types for the Zôni core library.

/// Top-level error enum for the Zôni core library.
///
/// Only [`ZoniError::InvalidParcelGeometry`] and [`ZoniError::Cancelled`]
/// abort a whole analysis; the orchestrator turns every other variant raised
/// by a sub-component into an "unavailable" sub-result plus a message.
#[derive(Debug, thiserror::Error)]
pub enum ZoniError {
    #[error("Invalid parcel geometry: {0}")]
    InvalidParcelGeometry(String),

    #[error("Missing layer: {0}")]
    MissingLayer(String),

    #[error("Unclassifiable zone code: {0}")]
    UnclassifiableZone(String),

    #[error("Slope raster unavailable: {0}")]
    RasterUnavailable(String),

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Analysis cancelled: {0}")]
    Cancelled(String),

    #[error("Parameter table error: {0}")]
    ParameterTable(String),

    #[error("Rulebook error: {0}")]
    Rulebook(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ZoniError {
    /// Whether this error must abort the whole analysis.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ZoniError::InvalidParcelGeometry(_) | ZoniError::Cancelled(_))
    }
}

#[cfg(feature = "python")]
impl From<ZoniError> for pyo3::PyErr {
    fn from(err: ZoniError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match &err {
            ZoniError::InvalidParcelGeometry(_)
            | ZoniError::InvalidScenario(_)
            | ZoniError::UnclassifiableZone(_)
            | ZoniError::GeoJson(_)
            | ZoniError::Json(_) => PyValueError::new_err(err.to_string()),
            ZoniError::ParameterTable(_) | ZoniError::Rulebook(_) => {
                PyValueError::new_err(err.to_string())
            }
            ZoniError::MissingLayer(_)
            | ZoniError::RasterUnavailable(_)
            | ZoniError::Cancelled(_) => PyRuntimeError::new_err(err.to_string()),
            ZoniError::Io(_) => PyIOError::new_err(err.to_string()),
        }
    }
}

pub type ZoniResult<T> = Result<T, ZoniError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_parcel_and_cancellation_errors_are_fatal() {
        assert!(ZoniError::InvalidParcelGeometry("empty".into()).is_fatal());
        assert!(ZoniError::Cancelled("deadline".into()).is_fatal());
        assert!(!ZoniError::RasterUnavailable("no raster".into()).is_fatal());
        assert!(!ZoniError::MissingLayer("roads".into()).is_fatal());
        assert!(!ZoniError::InvalidScenario("lot".into()).is_fatal());
    }
}
