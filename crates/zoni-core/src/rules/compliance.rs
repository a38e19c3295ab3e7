//! Building scenario vs. reference-zone parameters.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{ZoniError, ZoniResult};
use crate::models::BuildingScenario;
use crate::rules::parameters::ZoneParameters;

/// Slack for ratio comparisons (FAR, occupancy, permeability).
pub const RATIO_TOLERANCE: f64 = 1e-6;
/// Slack for height comparisons, in metres.
pub const HEIGHT_TOLERANCE_M: f64 = 0.01;

pub const FLOOR_AREA_RATIO: &str = "floor_area_ratio";
pub const OCCUPANCY_RATIO: &str = "occupancy_ratio";
pub const PERMEABILITY_RATIO: &str = "permeability_ratio";
pub const STORY_COUNT: &str = "story_count";
pub const HEIGHT_M: &str = "height_m";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub zone: String,
    pub parameters: ZoneParameters,
    pub is_compliant: bool,
    pub violations: Vec<String>,
    pub advisories: Vec<String>,
    /// Realized figures keyed by `floor_area_ratio`, `occupancy_ratio`,
    /// `permeability_ratio`, `story_count`, `height_m`.
    pub computed_ratios: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComplianceOutcome {
    Evaluated(ComplianceResult),
    NotEvaluated { reason: String },
}

impl ComplianceOutcome {
    pub fn result(&self) -> Option<&ComplianceResult> {
        match self {
            ComplianceOutcome::Evaluated(result) => Some(result),
            ComplianceOutcome::NotEvaluated { .. } => None,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(self, ComplianceOutcome::Evaluated(_))
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

/// Compare `scenario` with the envelope of `zone`.
///
/// Omitted scenario figures and unregulated parameters only produce
/// advisories; violations are reserved for realized values beyond a limit.
pub fn evaluate(
    zone: &str,
    parameters: &ZoneParameters,
    scenario: &BuildingScenario,
) -> ZoniResult<ComplianceResult> {
    let lot = scenario.area_lot_m2;
    if !lot.is_finite() || lot <= 0.0 {
        return Err(ZoniError::InvalidScenario(format!(
            "lot area must be a positive number, got {lot}"
        )));
    }

    let mut violations = Vec::new();
    let mut advisories = Vec::new();
    let mut computed = IndexMap::new();

    // Floor-area ratio
    match scenario.built_area_m2 {
        Some(built) => {
            let far = built / lot;
            computed.insert(FLOOR_AREA_RATIO.to_string(), far);
            if let Some(min) = parameters.ca_min {
                if far < min - RATIO_TOLERANCE {
                    violations.push(format!(
                        "Floor-area ratio {far:.2} is below the minimum {min:.2} of zone {zone} ({far:.2} vs {min:.2})."
                    ));
                }
            }
            match parameters.ca_max {
                Some(max) if far > max + RATIO_TOLERANCE => violations.push(format!(
                    "Floor-area ratio {far:.2} exceeds the maximum {max:.2} of zone {zone} ({far:.2} vs {max:.2})."
                )),
                _ => {
                    if let Some(bas) = parameters.ca_bas {
                        if far > bas + RATIO_TOLERANCE {
                            advisories.push(format!(
                                "Floor-area ratio {far:.2} exceeds the basic {bas:.2} of zone {zone}; \
                                 the additional area depends on onerous grant instruments."
                            ));
                        }
                    }
                }
            }
            if parameters.ca_max.is_none() && parameters.ca_min.is_none() {
                advisories.push(format!("Zone {zone} defines no floor-area ratio limit."));
            }
        }
        None => advisories.push(
            "Built area not provided; floor-area ratio not checked.".to_string(),
        ),
    }

    // Occupancy
    match scenario.footprint_area_m2 {
        Some(footprint) => {
            let occupancy = footprint / lot;
            computed.insert(OCCUPANCY_RATIO.to_string(), occupancy);
            match parameters.tocup.map(ZoneParameters::ratio) {
                Some(max) if occupancy > max + RATIO_TOLERANCE => violations.push(format!(
                    "Occupancy {} exceeds the maximum {} of zone {zone}.",
                    percent(occupancy),
                    percent(max)
                )),
                Some(_) => {}
                None => advisories.push(format!("Zone {zone} defines no occupancy limit.")),
            }
        }
        None => advisories.push(
            "Footprint area not provided; occupancy not checked.".to_string(),
        ),
    }

    // Permeability
    match scenario.permeable_area_m2 {
        Some(permeable) => {
            let permeability = permeable / lot;
            computed.insert(PERMEABILITY_RATIO.to_string(), permeability);
            match parameters.tperm.map(ZoneParameters::ratio) {
                Some(min) if permeability + RATIO_TOLERANCE < min => violations.push(format!(
                    "Permeability {} is below the minimum {} of zone {zone}.",
                    percent(permeability),
                    percent(min)
                )),
                Some(_) => {}
                None => advisories.push(format!("Zone {zone} defines no permeability minimum.")),
            }
        }
        None => advisories.push(
            "Permeable area not provided; permeability not checked.".to_string(),
        ),
    }

    // Stories
    match scenario.story_count {
        Some(stories) => {
            let stories = f64::from(stories);
            computed.insert(STORY_COUNT.to_string(), stories);
            match parameters.npav_max {
                Some(max) if stories > max => violations.push(format!(
                    "Story count {stories:.0} exceeds the maximum {max:.0} of zone {zone}."
                )),
                _ => {
                    if let Some(bas) = parameters.npav_bas {
                        if stories > bas {
                            advisories.push(format!(
                                "Story count {stories:.0} exceeds the basic {bas:.0} of zone {zone}."
                            ));
                        }
                    }
                }
            }
        }
        None => advisories.push("Story count not provided; stories not checked.".to_string()),
    }

    // Height
    match scenario.max_height_m {
        Some(height) => {
            computed.insert(HEIGHT_M.to_string(), height);
            match parameters.gab_max {
                Some(max) if height > max + HEIGHT_TOLERANCE_M => violations.push(format!(
                    "Height {height:.2} m exceeds the maximum {max:.2} m of zone {zone}."
                )),
                _ => {
                    if let Some(bas) = parameters.gab_bas {
                        if height > bas + HEIGHT_TOLERANCE_M {
                            advisories.push(format!(
                                "Height {height:.2} m exceeds the basic {bas:.2} m of zone {zone}."
                            ));
                        }
                    }
                }
            }
        }
        None => advisories.push("Maximum height not provided; height not checked.".to_string()),
    }

    tracing::debug!(zone, violations = violations.len(), "compliance evaluated");

    Ok(ComplianceResult {
        zone: zone.to_string(),
        parameters: parameters.clone(),
        is_compliant: violations.is_empty(),
        violations,
        advisories,
        computed_ratios: computed,
    })
}
