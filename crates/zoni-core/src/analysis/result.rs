//! The analysis aggregate. Assembled through [`AnalysisResultBuilder`] and
//! read-only once frozen.

use serde::Serialize;

use crate::errors::ZoniResult;
use crate::models::{AnalysisMessage, MessageLevel, ParcelSummary, RESULT_SCHEMA_VERSION};
use crate::rules::compliance::ComplianceOutcome;
use crate::rules::resolver::ResolvedZoning;
use crate::spatial::boundary::BoundaryResult;
use crate::spatial::constraints::EnvironmentalConstraints;
use crate::spatial::decomposer::ZoneDecomposition;
use crate::spatial::slope::SlopeOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    schema_version: i64,
    parcel: ParcelSummary,
    decomposition: ZoneDecomposition,
    boundary: BoundaryResult,
    zoning: ResolvedZoning,
    slope: SlopeOutcome,
    compliance: ComplianceOutcome,
    constraints: EnvironmentalConstraints,
    parameter_fingerprint: String,
    messages: Vec<AnalysisMessage>,
}

impl AnalysisResult {
    pub fn schema_version(&self) -> i64 {
        self.schema_version
    }

    pub fn parcel(&self) -> &ParcelSummary {
        &self.parcel
    }

    pub fn decomposition(&self) -> &ZoneDecomposition {
        &self.decomposition
    }

    pub fn boundary(&self) -> &BoundaryResult {
        &self.boundary
    }

    pub fn zoning(&self) -> &ResolvedZoning {
        &self.zoning
    }

    pub fn slope(&self) -> &SlopeOutcome {
        &self.slope
    }

    pub fn compliance(&self) -> &ComplianceOutcome {
        &self.compliance
    }

    pub fn constraints(&self) -> &EnvironmentalConstraints {
        &self.constraints
    }

    /// Fingerprint of the parameter table the analysis ran against.
    pub fn parameter_fingerprint(&self) -> &str {
        &self.parameter_fingerprint
    }

    pub fn messages(&self) -> &[AnalysisMessage] {
        &self.messages
    }

    pub fn messages_at(&self, level: MessageLevel) -> impl Iterator<Item = &AnalysisMessage> {
        self.messages.iter().filter(move |m| m.level == level)
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.level == MessageLevel::Error)
    }

    pub fn to_json(&self) -> ZoniResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> ZoniResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Collects sub-results while the pipeline runs. Anything never set freezes
/// to its empty or "not computed" form.
#[derive(Debug)]
pub struct AnalysisResultBuilder {
    parcel: ParcelSummary,
    decomposition: Option<ZoneDecomposition>,
    boundary: Option<BoundaryResult>,
    zoning: Option<ResolvedZoning>,
    slope: Option<SlopeOutcome>,
    compliance: Option<ComplianceOutcome>,
    constraints: Option<EnvironmentalConstraints>,
    parameter_fingerprint: String,
    messages: Vec<AnalysisMessage>,
}

impl AnalysisResultBuilder {
    pub fn new(parcel: ParcelSummary) -> Self {
        Self {
            parcel,
            decomposition: None,
            boundary: None,
            zoning: None,
            slope: None,
            compliance: None,
            constraints: None,
            parameter_fingerprint: String::new(),
            messages: Vec::new(),
        }
    }

    pub fn decomposition(&mut self, decomposition: ZoneDecomposition) -> &mut Self {
        self.decomposition = Some(decomposition);
        self
    }

    pub fn boundary(&mut self, boundary: BoundaryResult) -> &mut Self {
        self.boundary = Some(boundary);
        self
    }

    pub fn zoning(&mut self, zoning: ResolvedZoning) -> &mut Self {
        self.zoning = Some(zoning);
        self
    }

    pub fn slope(&mut self, slope: SlopeOutcome) -> &mut Self {
        self.slope = Some(slope);
        self
    }

    pub fn compliance(&mut self, compliance: ComplianceOutcome) -> &mut Self {
        self.compliance = Some(compliance);
        self
    }

    pub fn constraints(&mut self, constraints: EnvironmentalConstraints) -> &mut Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn parameter_fingerprint(&mut self, fingerprint: impl Into<String>) -> &mut Self {
        self.parameter_fingerprint = fingerprint.into();
        self
    }

    pub fn messages(&mut self, messages: impl IntoIterator<Item = AnalysisMessage>) -> &mut Self {
        self.messages.extend(messages);
        self
    }

    pub fn freeze(self) -> AnalysisResult {
        let parcel_area = self.parcel.area_m2;
        AnalysisResult {
            schema_version: RESULT_SCHEMA_VERSION,
            decomposition: self
                .decomposition
                .unwrap_or_else(|| ZoneDecomposition::empty(parcel_area)),
            boundary: self.boundary.unwrap_or_default(),
            zoning: self.zoning.unwrap_or_default(),
            slope: self.slope.unwrap_or_else(|| SlopeOutcome::Unavailable {
                reason: "slope analysis not run".to_string(),
            }),
            compliance: self.compliance.unwrap_or_else(|| ComplianceOutcome::NotEvaluated {
                reason: "compliance not evaluated".to_string(),
            }),
            constraints: self.constraints.unwrap_or_default(),
            parameter_fingerprint: self.parameter_fingerprint,
            messages: self.messages,
            parcel: self.parcel,
        }
    }
}
