//! Pipeline plumbing: configuration, guards, cancellation, the shared
//! parameter cache and the orchestrator that produces an [`AnalysisResult`].

pub mod cache;
pub mod cancel;
pub mod config;
pub mod guards;
pub mod orchestrator;
pub mod result;

pub use cancel::CancellationToken;
pub use config::AnalysisConfig;
pub use orchestrator::{analyze, AnalysisOrchestrator};
pub use result::{AnalysisResult, AnalysisResultBuilder};
