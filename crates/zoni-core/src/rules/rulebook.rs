//! Jurisdiction data the resolver consults: manual override notes, the
//! street → axis map, the mandatory-coexistence set and coexistence
//! observations.
//!
//! The built-in [`Rulebook::default`] carries the Porto Belo annex III data;
//! another jurisdiction can ship its own JSON document.

use std::path::Path;

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::errors::{ZoniError, ZoniResult};
use crate::rules::categories::normalize_code;

/// A manual exception that forces a zone onto the parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideNote {
    pub id: String,
    pub zone_code: String,
    /// Normalized tokens that must all appear in a frontage street name.
    #[serde(default)]
    pub street_tokens: Vec<String>,
    /// Whether a matching frontage street activates the note on its own.
    /// Non-inferable notes only raise a "confirm manually" observation.
    #[serde(default)]
    pub inferable: bool,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetZoneRule {
    /// Normalized substring searched in frontage street names.
    pub pattern: String,
    pub zone_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoexistenceObservation {
    /// Every code must be applied for the observation to be raised.
    pub zones: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rulebook {
    pub jurisdiction: String,
    pub notes: Vec<OverrideNote>,
    /// Tested in order; axis entries precede semi-axis entries.
    pub street_zones: Vec<StreetZoneRule>,
    /// Macro zones never superseded by axes or other macro zones.
    pub coexistence_set: Vec<String>,
    /// Urban macro zones applied proportionally when several coexist.
    /// A trailing `*` marks a prefix.
    pub urban_macro_group: Vec<String>,
    #[serde(default)]
    pub coexistence_observations: Vec<CoexistenceObservation>,
}

impl Default for Rulebook {
    fn default() -> Self {
        Self {
            jurisdiction: "Porto Belo/SC - LC 275/2025, annex III".to_string(),
            notes: vec![
                OverrideNote {
                    id: "10".to_string(),
                    zone_code: "ZEOT2".to_string(),
                    street_tokens: vec![
                        "SEBASTIAO".to_string(),
                        "MANOEL".to_string(),
                        "COELHO".to_string(),
                    ],
                    inferable: false,
                    rationale: "Note 10 of annex III applied: development with single access \
                        through a specific street in zone ZEOT2. ZEOT2 prevails over the other \
                        incident zones for urban indices and parameters."
                        .to_string(),
                },
                OverrideNote {
                    id: "37".to_string(),
                    zone_code: "MUQ3".to_string(),
                    street_tokens: vec!["LUCIO".to_string(), "MENDES".to_string()],
                    inferable: true,
                    rationale: "Note 37 of annex III applied: main access facing Rua Lucio \
                        Joaquim Mendes, classified as MUQ3. MUQ3 prevails for urban indices and \
                        front setback on the main frontage; other frontages may follow the \
                        incident macro zones."
                        .to_string(),
                },
            ],
            street_zones: vec![
                StreetZoneRule {
                    pattern: "AV GOVERNADOR CELSO RAMOS".to_string(),
                    zone_code: "EU1".to_string(),
                },
                StreetZoneRule {
                    pattern: "RUA SAO PAULO".to_string(),
                    zone_code: "SEMIEIXO".to_string(),
                },
                StreetZoneRule {
                    pattern: "RUA OLINDINA PEIXOTO".to_string(),
                    zone_code: "SEMIEIXO".to_string(),
                },
            ],
            coexistence_set: ["MUO", "MUPA1", "MUPA2", "MRPA"]
                .into_iter()
                .map(String::from)
                .collect(),
            urban_macro_group: ["MUQ*", "MUO*", "MUCON*", "MEU", "MUIS"]
                .into_iter()
                .map(String::from)
                .collect(),
            coexistence_observations: vec![CoexistenceObservation {
                zones: vec!["MUIS".to_string(), "MEU".to_string()],
                text: "MUIS and MEU coexist on the parcel. Art. 29 of LC 278/2025 applies to \
                    the conversion of urban expansion area into urban area, with immediate \
                    planning and tax effects."
                    .to_string(),
            }],
        }
    }
}

/// Upper-case, trim and strip diacritics (`"Lúcio"` → `"LUCIO"`).
pub fn normalize_street_name(name: &str) -> String {
    name.trim()
        .to_uppercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

impl Rulebook {
    pub fn from_json_str(text: &str) -> ZoniResult<Self> {
        let rulebook: Rulebook =
            serde_json::from_str(text).map_err(|e| ZoniError::Rulebook(e.to_string()))?;
        rulebook.validate()?;
        Ok(rulebook)
    }

    pub fn load(path: &Path) -> ZoniResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> ZoniResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> ZoniResult<()> {
        for (i, note) in self.notes.iter().enumerate() {
            if note.id.trim().is_empty() || note.zone_code.trim().is_empty() {
                return Err(ZoniError::Rulebook(format!(
                    "note #{i} needs both an id and a zone code"
                )));
            }
            if self.notes[..i].iter().any(|n| n.id == note.id) {
                return Err(ZoniError::Rulebook(format!("duplicate note id '{}'", note.id)));
            }
            if note.inferable && note.street_tokens.is_empty() {
                return Err(ZoniError::Rulebook(format!(
                    "note '{}' is inferable but has no street tokens",
                    note.id
                )));
            }
        }
        Ok(())
    }

    pub fn note(&self, id: &str) -> Option<&OverrideNote> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Whether a frontage street name carries every token of the note.
    pub fn street_matches_note(note: &OverrideNote, street_name: &str) -> bool {
        if note.street_tokens.is_empty() {
            return false;
        }
        let normalized = normalize_street_name(street_name);
        note.street_tokens
            .iter()
            .all(|token| normalized.contains(&normalize_street_name(token)))
    }

    /// Axis or semi-axis code implied by a frontage street name.
    pub fn zone_for_street(&self, street_name: &str) -> Option<&str> {
        let normalized = normalize_street_name(street_name);
        self.street_zones
            .iter()
            .find(|rule| normalized.contains(&normalize_street_name(&rule.pattern)))
            .map(|rule| rule.zone_code.as_str())
    }

    pub fn in_coexistence_set(&self, code: &str) -> bool {
        let code = normalize_code(code);
        self.coexistence_set.iter().any(|c| normalize_code(c) == code)
    }

    pub fn in_urban_macro_group(&self, code: &str) -> bool {
        let code = normalize_code(code);
        self.urban_macro_group.iter().any(|entry| {
            let entry = normalize_code(entry);
            match entry.strip_suffix('*') {
                Some(prefix) => code.starts_with(prefix),
                None => code == entry,
            }
        })
    }

    /// Observations whose zones are all among `codes`.
    pub fn observations_for<'a>(&'a self, codes: &[&str]) -> Vec<&'a str> {
        let present: Vec<String> = codes.iter().map(|c| normalize_code(c)).collect();
        self.coexistence_observations
            .iter()
            .filter(|obs| {
                obs.zones
                    .iter()
                    .all(|z| present.contains(&normalize_code(z)))
            })
            .map(|obs| obs.text.as_str())
            .collect()
    }
}
