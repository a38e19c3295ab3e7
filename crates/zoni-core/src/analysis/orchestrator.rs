//! Single-parcel pipeline: parcel → {zoning, boundary, slope, constraints}
//! in parallel → resolver → compliance → frozen result.

use std::sync::Arc;
use std::time::Instant;

use crate::analysis::cancel::CancellationToken;
use crate::analysis::config::AnalysisConfig;
use crate::analysis::result::{AnalysisResult, AnalysisResultBuilder};
use crate::errors::ZoniResult;
use crate::models::{AnalysisMessage, AnalysisRequest, BuildingScenario, Component};
use crate::rules::compliance::{evaluate, ComplianceOutcome};
use crate::rules::parameters::ParameterTable;
use crate::rules::resolver::{ReferenceBasis, ResolvedZoning, ZoneOverlapResolver};
use crate::rules::rulebook::Rulebook;
use crate::spatial::geometry::ParcelGeometry;
use crate::spatial::provider::{GeometryProvider, LayerRole};
use crate::spatial::{boundary, constraints, decomposer, slope};

pub struct AnalysisOrchestrator {
    config: AnalysisConfig,
    resolver: ZoneOverlapResolver,
}

impl AnalysisOrchestrator {
    pub fn new(
        rulebook: Arc<Rulebook>,
        parameters: Arc<ParameterTable>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            config: config.clamped(),
            resolver: ZoneOverlapResolver::new(rulebook, parameters),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ZoneOverlapResolver {
        &self.resolver
    }

    /// Run the whole analysis for one parcel.
    ///
    /// Fails only when the parcel geometry cannot be built or the work is
    /// cancelled; every other problem degrades its sub-result and is
    /// reported in the result messages.
    pub fn analyze(
        &self,
        provider: &dyn GeometryProvider,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> ZoniResult<AnalysisResult> {
        let started = Instant::now();
        cancel.check("parcel")?;

        let parcel = ParcelGeometry::dissolve(request.parcel_geometries.clone()).map_err(|err| {
            tracing::warn!(error = %err, parts = request.parcel_geometries.len(), "parcel rejected");
            err
        })?;
        let mut messages = Vec::new();
        if parcel.part_count() > 1 {
            messages.push(AnalysisMessage::info(
                Component::Parcel,
                format!(
                    "{} parcel parts dissolved ({} union).",
                    parcel.part_count(),
                    parcel.repair_stage().as_str()
                ),
            ));
        }

        let config = &self.config;
        let slope_cancel = cancel.child(config.slope_deadline());
        let ((decomposition, boundary), (slope, constraints)) = rayon::join(
            || {
                rayon::join(
                    || {
                        let mut msgs = Vec::new();
                        let result = decomposer::decompose(
                            &parcel,
                            provider.vector_layer(LayerRole::Zoning),
                            config.zone_code_field.as_deref(),
                            &mut msgs,
                        );
                        (result, msgs)
                    },
                    || {
                        let mut msgs = Vec::new();
                        let result = boundary::classify(
                            &parcel,
                            provider.vector_layer(LayerRole::Parcels),
                            provider.vector_layer(LayerRole::Roads),
                            config,
                            &mut msgs,
                        );
                        (result, msgs)
                    },
                )
            },
            || {
                rayon::join(
                    || {
                        let mut msgs = Vec::new();
                        let result = slope::classify_outcome(
                            &parcel,
                            provider.raster_layer(LayerRole::SlopeRaster),
                            Some(parcel.area_m2()),
                            config.area_mismatch_tolerance,
                            &slope_cancel,
                            &mut msgs,
                        );
                        (result, msgs)
                    },
                    || {
                        let mut msgs = Vec::new();
                        let result = constraints::screen(&parcel, provider, &mut msgs);
                        (result, msgs)
                    },
                )
            },
        );

        let (decomposition, msgs) = decomposition;
        messages.extend(msgs);
        let (boundary, msgs) = boundary;
        messages.extend(msgs);
        let (slope, msgs) = slope;
        let slope = slope?;
        messages.extend(msgs);
        let (constraints, msgs) = constraints;
        messages.extend(msgs);

        cancel.check("resolver")?;
        let zoning = self.resolver.resolve(
            &decomposition,
            Some(&boundary),
            &request.manual_notes,
            &mut messages,
        );
        let compliance = self.compliance(&zoning, &request.scenario, &mut messages);

        let mut builder = AnalysisResultBuilder::new(parcel.summary());
        builder
            .decomposition(decomposition)
            .boundary(boundary)
            .zoning(zoning)
            .slope(slope)
            .compliance(compliance)
            .constraints(constraints)
            .parameter_fingerprint(self.resolver.parameters().fingerprint())
            .messages(messages);
        let result = builder.freeze();

        tracing::info!(
            area_m2 = result.parcel().area_m2,
            rule = %result.zoning().rule_label,
            reference = ?result.zoning().reference_zone,
            messages = result.messages().len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "analysis complete"
        );
        Ok(result)
    }

    fn compliance(
        &self,
        zoning: &ResolvedZoning,
        scenario: &BuildingScenario,
        messages: &mut Vec<AnalysisMessage>,
    ) -> ComplianceOutcome {
        let Some(zone) = zoning.reference_zone.as_deref() else {
            return ComplianceOutcome::NotEvaluated {
                reason: "no reference zone".to_string(),
            };
        };
        let parameters = zoning
            .reference_application()
            .and_then(|app| app.parameters.as_ref())
            .or_else(|| self.resolver.parameters().get(zone));
        let Some(parameters) = parameters else {
            messages.push(AnalysisMessage::advisory(
                Component::Compliance,
                format!("No parameters found for reference zone {zone}; compliance not evaluated."),
            ));
            return ComplianceOutcome::NotEvaluated {
                reason: format!("no parameters for zone {zone}"),
            };
        };
        if zoning.reference_basis == ReferenceBasis::SynthesisFallback {
            messages.push(AnalysisMessage::advisory(
                Component::Compliance,
                format!(
                    "Compliance is checked against {zone}, a synthesis-only reference; \
                     confirm the applicable zone before relying on it."
                ),
            ));
        }
        match evaluate(zone, parameters, scenario) {
            Ok(result) => ComplianceOutcome::Evaluated(result),
            Err(err) => {
                messages.push(AnalysisMessage::error(Component::Compliance, err.to_string()));
                ComplianceOutcome::NotEvaluated {
                    reason: err.to_string(),
                }
            }
        }
    }
}

/// One-shot form of [`AnalysisOrchestrator::analyze`].
pub fn analyze(
    provider: &dyn GeometryProvider,
    request: &AnalysisRequest,
    config: AnalysisConfig,
    rulebook: Arc<Rulebook>,
    parameters: Arc<ParameterTable>,
    cancel: &CancellationToken,
) -> ZoniResult<AnalysisResult> {
    AnalysisOrchestrator::new(rulebook, parameters, config).analyze(provider, request, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ZoniError;
    use crate::models::MessageLevel;
    use crate::rules::parameters::ZoneParameters;
    use crate::spatial::geometry::tests::rect;
    use crate::spatial::provider::{Attributes, Feature, FeatureLayer, LayerSet};
    use serde_json::json;

    fn zone(code: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Feature {
        let mut attrs = Attributes::new();
        attrs.insert("ZONA".to_string(), json!(code));
        Feature::new(rect(x0, y0, x1, y1), attrs)
    }

    fn orchestrator() -> AnalysisOrchestrator {
        let table = ParameterTable::from_parameters(vec![(
            "MUQ2".to_string(),
            ZoneParameters {
                ca_max: Some(1.0),
                ..ZoneParameters::default()
            },
        )]);
        AnalysisOrchestrator::new(
            Arc::new(Rulebook::default()),
            Arc::new(table),
            AnalysisConfig::default(),
        )
    }

    fn request(built: f64) -> AnalysisRequest {
        AnalysisRequest::new(
            vec![rect(0.0, 0.0, 20.0, 25.0)],
            BuildingScenario {
                built_area_m2: Some(built),
                ..BuildingScenario::with_lot_area(500.0)
            },
        )
    }

    #[test]
    fn test_zoning_only_provider_degrades_gracefully() {
        let provider = LayerSet::new().with_vector(
            LayerRole::Zoning,
            FeatureLayer::new("zoning", vec![zone("MUQ2", -10.0, -10.0, 50.0, 50.0)]),
        );
        let result = orchestrator()
            .analyze(&provider, &request(600.0), &CancellationToken::new())
            .unwrap();
        assert_eq!(result.zoning().reference_zone.as_deref(), Some("MUQ2"));
        assert!(!result.slope().is_available());
        let compliance = result.compliance().result().unwrap();
        assert_eq!(compliance.violations.len(), 1);
        assert!(result.messages_at(MessageLevel::Advisory).count() >= 2);
        assert!(!result.has_errors());
    }

    #[test]
    fn test_missing_parameters_skip_compliance() {
        let provider = LayerSet::new().with_vector(
            LayerRole::Zoning,
            FeatureLayer::new("zoning", vec![zone("ZR1", -10.0, -10.0, 50.0, 50.0)]),
        );
        let result = orchestrator()
            .analyze(&provider, &request(100.0), &CancellationToken::new())
            .unwrap();
        assert!(matches!(
            result.compliance(),
            ComplianceOutcome::NotEvaluated { reason } if reason.contains("ZR1")
        ));
    }

    #[test]
    fn test_bad_lot_area_is_reported_not_fatal() {
        let provider = LayerSet::new().with_vector(
            LayerRole::Zoning,
            FeatureLayer::new("zoning", vec![zone("MUQ2", -10.0, -10.0, 50.0, 50.0)]),
        );
        let mut req = request(100.0);
        req.scenario.area_lot_m2 = 0.0;
        let result = orchestrator()
            .analyze(&provider, &req, &CancellationToken::new())
            .unwrap();
        assert!(!result.compliance().is_evaluated());
        assert!(result.has_errors());
    }

    #[test]
    fn test_empty_parcel_aborts() {
        let req = AnalysisRequest::new(Vec::new(), BuildingScenario::with_lot_area(1.0));
        assert!(matches!(
            orchestrator().analyze(&LayerSet::new(), &req, &CancellationToken::new()),
            Err(ZoniError::InvalidParcelGeometry(_))
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            orchestrator().analyze(&LayerSet::new(), &request(1.0), &cancel),
            Err(ZoniError::Cancelled(_))
        ));
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let provider = LayerSet::new().with_vector(
            LayerRole::Zoning,
            FeatureLayer::new(
                "zoning",
                vec![
                    zone("MUQ2", -10.0, -10.0, 10.0, 50.0),
                    zone("EU1", 10.0, -10.0, 50.0, 50.0),
                ],
            ),
        );
        let engine = orchestrator();
        let a = engine
            .analyze(&provider, &request(300.0), &CancellationToken::new())
            .unwrap();
        let b = engine
            .analyze(&provider, &request(300.0), &CancellationToken::new())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.zoning().reference_zone.as_deref(), Some("EU1"));
    }
}
