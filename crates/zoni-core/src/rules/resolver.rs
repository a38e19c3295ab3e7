//! Zone overlap resolution: which zones apply and which one is the reference
//! for parameter synthesis.
//!
//! The cascade, first match deciding the rule and the reference zone:
//!
//! 0. nothing incident and no note → no zoning
//! 1. active override notes (manual flag, or inferred from a frontage street)
//! 2. classify every code
//! 3. any special zone → largest special
//! 4. axis with a macro outside the coexistence set → largest axis; else
//!    axis with semi-axis → largest axis
//! 5. any zone of the mandatory-coexistence set → coexistence, reference only
//!    from the axes
//! 6. axes without any macro → largest axis
//! 7. macros (urban or environmental) without axis → the single macro, or
//!    none when several
//! 8. no reference yet → largest non-environmental zone, for synthesis only
//! 9. environmental macros are always listed as overlays
//!
//! "Largest" breaks ties by the smallest code.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisMessage, Component};
use crate::rules::categories::{try_classify_zone_code, ZoneCategory};
use crate::rules::parameters::{ParameterTable, ZoneParameters};
use crate::rules::rulebook::{OverrideNote, Rulebook};
use crate::spatial::boundary::BoundaryResult;
use crate::spatial::decomposer::ZoneDecomposition;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneOrigin {
    Intersection,
    Note { note_id: String },
    Frontage { street_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneApplication {
    pub zone_code: String,
    pub category: ZoneCategory,
    pub area_m2: f64,
    pub percent_of_total: f64,
    pub parameters: Option<ZoneParameters>,
    pub notes: Vec<String>,
    pub origin: ZoneOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleOutcome {
    NoZoning,
    NoteOverride { note_ids: Vec<String>, zone: String },
    SpecialPredominant { zone: String },
    AxisOverMacro { axis: String },
    AxisOverSemiAxis { axis: String },
    CoexistenceFixed { fixed: Vec<String>, axis: Option<String> },
    AxisOnly { axis: String },
    MacroUnique { zone: String },
    MacroMultiple { macros: Vec<String> },
    NoSpecificRule,
}

impl RuleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RuleOutcome::NoZoning => "no zoning",
            RuleOutcome::NoteOverride { .. } => "manual override note",
            RuleOutcome::SpecialPredominant { .. } => "special predominates",
            RuleOutcome::AxisOverMacro { .. } => "axis over macro",
            RuleOutcome::AxisOverSemiAxis { .. } => "axis over semi-axis",
            RuleOutcome::CoexistenceFixed { .. } => "mandatory coexistence",
            RuleOutcome::AxisOnly { .. } => "axis only",
            RuleOutcome::MacroUnique { .. } => "single macro zone",
            RuleOutcome::MacroMultiple { .. } => "multiple macro zones",
            RuleOutcome::NoSpecificRule => "no specific rule",
        }
    }

    /// Reference zone chosen by the rule itself (before any fallback).
    pub fn reference_zone(&self) -> Option<&str> {
        match self {
            RuleOutcome::NoteOverride { zone, .. }
            | RuleOutcome::SpecialPredominant { zone }
            | RuleOutcome::MacroUnique { zone } => Some(zone),
            RuleOutcome::AxisOverMacro { axis }
            | RuleOutcome::AxisOverSemiAxis { axis }
            | RuleOutcome::AxisOnly { axis } => Some(axis),
            RuleOutcome::CoexistenceFixed { axis, .. } => axis.as_deref(),
            RuleOutcome::NoZoning
            | RuleOutcome::MacroMultiple { .. }
            | RuleOutcome::NoSpecificRule => None,
        }
    }

    fn rationale(&self, rulebook: &Rulebook) -> String {
        match self {
            RuleOutcome::NoZoning => "No zone was identified over the parcel. Check that the zoning \
                layer is correct or whether the parcel lies outside the area covered by the zoning code."
                .to_string(),
            RuleOutcome::NoteOverride { note_ids, .. } => note_ids
                .iter()
                .filter_map(|id| rulebook.note(id))
                .map(|note| note.rationale.clone())
                .collect::<Vec<_>>()
                .join(" "),
            RuleOutcome::SpecialPredominant { zone } => format!(
                "Special zones are incident over the parcel. Under the overlap rules the special zone \
                 with the largest area ({zone}) prevails for the main urban parameters, without \
                 prejudice to additional constraints from axes or macro zones."
            ),
            RuleOutcome::AxisOverMacro { axis } => format!(
                "Urban axis zones are incident together with macro zones not protected by a \
                 coexistence regime. Axis {axis} prevails for the main urban parameters; the \
                 macro zones keep applying over the remaining parcel areas."
            ),
            RuleOutcome::AxisOverSemiAxis { axis } => format!(
                "Frontages face both an urban axis and a semi-axis. Following the road hierarchy, \
                 axis {axis} prevails for the main urban parameters."
            ),
            RuleOutcome::CoexistenceFixed { fixed, .. } => format!(
                "Macro zones under a mandatory coexistence regime were identified ({}). They are \
                 not superseded by axes, semi-axes or other macro zones; each applies exclusively \
                 over its own area of the parcel.",
                fixed.join(", ")
            ),
            RuleOutcome::AxisOnly { axis } => format!(
                "Only urban axis zones were identified over the parcel, with no associated macro \
                 zone. The axis with the largest area ({axis}) is taken as the main zone; the \
                 reading should be completed with the master plan and the zoning annex."
            ),
            RuleOutcome::MacroUnique { zone } => format!(
                "A single macro zone was identified over the parcel ({zone}). Its rules apply \
                 directly to the urban parameters, with no axis overlap."
            ),
            RuleOutcome::MacroMultiple { macros } => format!(
                "Several macro zones are incident over the parcel ({}). No precedence rule applies; \
                 the final interpretation depends on a case-by-case review of each zone's area, \
                 the frontage positions and the zoning code.",
                macros.join(", ")
            ),
            RuleOutcome::NoSpecificRule => "Zones are incident over the parcel, but the set matches \
                none of the specific rules (override notes, axis over macro zone or special zone). \
                The main zone must be defined by technical review based on the relative areas and \
                a direct reading of the zoning code."
                .to_string(),
        }
    }
}

/// Why `reference_zone` was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceBasis {
    Rule,
    SynthesisFallback,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalOverlay {
    pub zone_code: String,
    pub area_m2: f64,
    pub percent_of_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedZoning {
    pub applied_zones: Vec<ZoneApplication>,
    pub active_notes: Vec<String>,
    pub rule: RuleOutcome,
    pub rule_label: String,
    pub rationale_text: String,
    pub reference_zone: Option<String>,
    pub reference_basis: ReferenceBasis,
    pub observations: Vec<String>,
    pub environmental_overlays: Vec<EnvironmentalOverlay>,
    pub special_zones: Vec<String>,
    pub axis_zones: Vec<String>,
    pub semi_axis_zones: Vec<String>,
    pub macro_zones: Vec<String>,
}

/// The "no zoning" resolution.
impl Default for ResolvedZoning {
    fn default() -> Self {
        let rule = RuleOutcome::NoZoning;
        Self {
            applied_zones: Vec::new(),
            active_notes: Vec::new(),
            rule_label: rule.label().to_string(),
            rationale_text: rule.rationale(&Rulebook::default()),
            rule,
            reference_zone: None,
            reference_basis: ReferenceBasis::None,
            observations: Vec::new(),
            environmental_overlays: Vec::new(),
            special_zones: Vec::new(),
            axis_zones: Vec::new(),
            semi_axis_zones: Vec::new(),
            macro_zones: Vec::new(),
        }
    }
}

impl ResolvedZoning {
    pub fn application(&self, zone_code: &str) -> Option<&ZoneApplication> {
        self.applied_zones.iter().find(|z| z.zone_code == zone_code)
    }

    pub fn reference_application(&self) -> Option<&ZoneApplication> {
        self.reference_zone
            .as_deref()
            .and_then(|code| self.application(code))
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

struct ZoneDraft {
    area_m2: f64,
    origin: ZoneOrigin,
    notes: Vec<String>,
    category: ZoneCategory,
}

/// Largest area wins; `codes` must be sorted so ties keep the smallest code.
fn largest(codes: &[String], zones: &IndexMap<String, ZoneDraft>) -> Option<String> {
    let mut best: Option<(&String, f64)> = None;
    for code in codes {
        let area = zones.get(code).map_or(0.0, |z| z.area_m2);
        if best.map_or(true, |(_, a)| area > a) {
            best = Some((code, area));
        }
    }
    best.map(|(code, _)| code.clone())
}

fn codes_in(zones: &IndexMap<String, ZoneDraft>, category: ZoneCategory) -> Vec<String> {
    zones
        .iter()
        .filter(|(_, z)| z.category == category)
        .map(|(code, _)| code.clone())
        .collect()
}

/// Rule cascade over one parcel's zoning incidence. Holds the shared,
/// read-only rulebook and parameter table.
#[derive(Debug, Clone)]
pub struct ZoneOverlapResolver {
    rulebook: Arc<Rulebook>,
    parameters: Arc<ParameterTable>,
}

impl ZoneOverlapResolver {
    pub fn new(rulebook: Arc<Rulebook>, parameters: Arc<ParameterTable>) -> Self {
        Self {
            rulebook,
            parameters,
        }
    }

    pub fn rulebook(&self) -> &Rulebook {
        &self.rulebook
    }

    pub fn parameters(&self) -> &ParameterTable {
        &self.parameters
    }

    /// Notes active for this parcel plus the observations raised while
    /// checking them.
    fn active_notes<'r>(
        &'r self,
        streets: &[&str],
        manual_notes: &IndexMap<String, bool>,
        observations: &mut Vec<String>,
        messages: &mut Vec<AnalysisMessage>,
    ) -> Vec<&'r OverrideNote> {
        for id in manual_notes.keys() {
            if self.rulebook.note(id).is_none() {
                messages.push(AnalysisMessage::advisory(
                    Component::Resolver,
                    format!("Manual note '{id}' is not defined in the rulebook and was ignored."),
                ));
            }
        }

        let mut active = Vec::new();
        for note in &self.rulebook.notes {
            let manual = manual_notes.get(&note.id).copied().unwrap_or(false);
            let street = streets
                .iter()
                .find(|s| Rulebook::street_matches_note(note, s));
            if manual {
                active.push(note);
            } else if let Some(street) = street {
                if note.inferable {
                    observations.push(format!(
                        "Note {} inferred from the frontage on '{street}'.",
                        note.id
                    ));
                    active.push(note);
                } else {
                    observations.push(format!(
                        "The parcel fronts '{street}', which matches note {}; confirm manually \
                         whether the note applies.",
                        note.id
                    ));
                }
            }
        }
        active
    }

    pub fn resolve(
        &self,
        decomposition: &ZoneDecomposition,
        boundary: Option<&BoundaryResult>,
        manual_notes: &IndexMap<String, bool>,
        messages: &mut Vec<AnalysisMessage>,
    ) -> ResolvedZoning {
        let streets: Vec<&str> = boundary
            .map(|b| b.frontage_streets().collect())
            .unwrap_or_default();
        let mut observations = Vec::new();

        // 1. Override notes
        let notes = self.active_notes(&streets, manual_notes, &mut observations, messages);

        // 0. Nothing to resolve
        if decomposition.is_empty() && notes.is_empty() {
            messages.push(AnalysisMessage::advisory(
                Component::Resolver,
                "No zoning incidence found for the parcel.",
            ));
            return ResolvedZoning {
                observations,
                ..ResolvedZoning::default()
            };
        }

        let mut zones: IndexMap<String, ZoneDraft> = IndexMap::new();
        for incidence in &decomposition.incidences {
            zones.insert(
                incidence.zone_code.clone(),
                ZoneDraft {
                    area_m2: incidence.area_m2,
                    origin: ZoneOrigin::Intersection,
                    notes: Vec::new(),
                    category: ZoneCategory::Ordinary,
                },
            );
        }
        for note in &notes {
            let draft = zones.entry(note.zone_code.clone()).or_insert(ZoneDraft {
                area_m2: 0.0,
                origin: ZoneOrigin::Intersection,
                notes: Vec::new(),
                category: ZoneCategory::Ordinary,
            });
            if draft.notes.is_empty() {
                draft.origin = ZoneOrigin::Note {
                    note_id: note.id.clone(),
                };
            }
            draft.notes.push(note.id.clone());
        }
        for street in &streets {
            if let Some(code) = self.rulebook.zone_for_street(street) {
                if !zones.contains_key(code) {
                    observations.push(format!(
                        "Frontage on '{street}' brings zone {code} into the analysis."
                    ));
                    zones.insert(
                        code.to_string(),
                        ZoneDraft {
                            area_m2: 0.0,
                            origin: ZoneOrigin::Frontage {
                                street_name: street.to_string(),
                            },
                            notes: Vec::new(),
                            category: ZoneCategory::Ordinary,
                        },
                    );
                }
            }
        }
        zones.sort_keys();

        // 2. Classification
        for (code, draft) in zones.iter_mut() {
            draft.category = match try_classify_zone_code(code) {
                Ok(category) => category,
                Err(err) => {
                    messages.push(AnalysisMessage::info(
                        Component::Resolver,
                        format!("{err}; treated as an ordinary zone."),
                    ));
                    ZoneCategory::Ordinary
                }
            };
        }

        let special = codes_in(&zones, ZoneCategory::Special);
        let axis = codes_in(&zones, ZoneCategory::Axis);
        let semi = codes_in(&zones, ZoneCategory::SemiAxis);
        let environmental = codes_in(&zones, ZoneCategory::EnvironmentalMacro);
        let macros: Vec<String> = zones
            .iter()
            .filter(|(_, z)| z.category.is_macro())
            .map(|(code, _)| code.clone())
            .collect();
        let fixed: Vec<String> = zones
            .keys()
            .filter(|code| self.rulebook.in_coexistence_set(code))
            .cloned()
            .collect();

        // 3–7. Precedence
        let rule = if let Some(first) = notes.first() {
            RuleOutcome::NoteOverride {
                note_ids: notes.iter().map(|n| n.id.clone()).collect(),
                zone: first.zone_code.clone(),
            }
        } else if let Some(zone) = largest(&special, &zones) {
            RuleOutcome::SpecialPredominant { zone }
        } else if !axis.is_empty()
            && macros.iter().any(|code| !self.rulebook.in_coexistence_set(code))
        {
            RuleOutcome::AxisOverMacro {
                axis: largest(&axis, &zones).unwrap_or_default(),
            }
        } else if !axis.is_empty() && !semi.is_empty() {
            RuleOutcome::AxisOverSemiAxis {
                axis: largest(&axis, &zones).unwrap_or_default(),
            }
        } else if !fixed.is_empty() {
            RuleOutcome::CoexistenceFixed {
                fixed: fixed.clone(),
                axis: largest(&axis, &zones),
            }
        } else if !axis.is_empty() && macros.is_empty() {
            RuleOutcome::AxisOnly {
                axis: largest(&axis, &zones).unwrap_or_default(),
            }
        } else if axis.is_empty() && macros.len() == 1 {
            RuleOutcome::MacroUnique {
                zone: macros[0].clone(),
            }
        } else if axis.is_empty() && macros.len() > 1 {
            RuleOutcome::MacroMultiple {
                macros: macros.clone(),
            }
        } else {
            RuleOutcome::NoSpecificRule
        };

        if let RuleOutcome::MacroMultiple { macros } = &rule {
            messages.push(AnalysisMessage::advisory(
                Component::Resolver,
                format!(
                    "Multiple macro zones ({}) with no precedence rule; manual review is recommended.",
                    macros.join(", ")
                ),
            ));
        }

        let mut rationale = vec![rule.rationale(&self.rulebook)];
        if !special.is_empty() && !matches!(rule, RuleOutcome::SpecialPredominant { .. }) {
            rationale.push(format!(
                "Special zones incident: {}. They are more restrictive regimes and must be \
                 observed together with the others.",
                special.join(", ")
            ));
        }
        if !axis.is_empty() || !semi.is_empty() {
            let names: Vec<&str> = axis.iter().chain(&semi).map(String::as_str).collect();
            rationale.push(format!(
                "Axis/semi-axis incidence: {}. Front setbacks on frontages facing these streets \
                 are measured from the street axis; other frontages follow the corresponding \
                 macro or ordinary zones.",
                names.join(", ")
            ));
        }
        if !environmental.is_empty() {
            rationale.push(format!(
                "Environmental macro zone(s) identified: {}. These regimes are not overridden by \
                 axes or urban zones; their constraints apply in proportion to the incident area.",
                environmental.join(", ")
            ));
        }
        let urban_group: Vec<&str> = zones
            .keys()
            .filter(|code| self.rulebook.in_urban_macro_group(code))
            .map(String::as_str)
            .collect();
        if urban_group.len() > 1 {
            rationale.push(format!(
                "Urban macro zones of the coexistence group coexist ({}). Urban parameters apply \
                 in proportion to the area of each macro zone.",
                urban_group.join(", ")
            ));
        }
        let codes: Vec<&str> = zones.keys().map(String::as_str).collect();
        observations.extend(
            self.rulebook
                .observations_for(&codes)
                .into_iter()
                .map(str::to_string),
        );

        // 8. Fallback
        let (reference_zone, reference_basis) = match rule.reference_zone() {
            Some(zone) => (Some(zone.to_string()), ReferenceBasis::Rule),
            None if zones.is_empty() => (None, ReferenceBasis::None),
            None => {
                let candidates: Vec<String> = zones
                    .iter()
                    .filter(|(_, z)| z.category != ZoneCategory::EnvironmentalMacro)
                    .map(|(code, _)| code.clone())
                    .collect();
                let candidates = if candidates.is_empty() {
                    zones.keys().cloned().collect()
                } else {
                    candidates
                };
                let zone = largest(&candidates, &zones);
                if let Some(zone) = &zone {
                    rationale.push(format!(
                        "For parameter synthesis only, zone '{zone}' is adopted as reference \
                         because it has the largest incident area; this is not a legal determination."
                    ));
                }
                (zone, ReferenceBasis::SynthesisFallback)
            }
        };

        // 9. Overlays and applications
        let total = decomposition.total_area_m2;
        let share = |area: f64| if total > 0.0 { area / total * 100.0 } else { 0.0 };
        let environmental_overlays = environmental
            .iter()
            .map(|code| {
                let area_m2 = zones.get(code).map_or(0.0, |z| z.area_m2);
                EnvironmentalOverlay {
                    zone_code: code.clone(),
                    area_m2,
                    percent_of_total: share(area_m2),
                }
            })
            .collect();

        let applied_zones: Vec<ZoneApplication> = zones
            .into_iter()
            .map(|(zone_code, draft)| ZoneApplication {
                parameters: self.parameters.get(&zone_code).cloned(),
                category: draft.category,
                area_m2: draft.area_m2,
                percent_of_total: share(draft.area_m2),
                notes: draft.notes,
                origin: draft.origin,
                zone_code,
            })
            .collect();

        tracing::debug!(
            rule = rule.label(),
            reference = ?reference_zone,
            zones = applied_zones.len(),
            "zoning resolved"
        );

        ResolvedZoning {
            applied_zones,
            active_notes: notes.iter().map(|n| n.id.clone()).collect(),
            rule_label: rule.label().to_string(),
            rationale_text: rationale.join(" "),
            rule,
            reference_zone,
            reference_basis,
            observations,
            environmental_overlays,
            special_zones: special,
            axis_zones: axis,
            semi_axis_zones: semi,
            macro_zones: macros,
        }
    }
}
