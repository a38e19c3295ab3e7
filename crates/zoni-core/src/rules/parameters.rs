//! Zone parameter table: loading, decimal-comma parsing and round-trip.
//!
//! File layout: `{ "<zone code>": { "indices": { "CA_max": "1,5", ... }, ... } }`.
//! Known numeric indices are parsed; every other key, inside or outside
//! `indices`, is kept verbatim and in order.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{ZoniError, ZoniResult};
use crate::rules::categories::normalize_code;

const INDICES_KEY: &str = "indices";

/// Parse a number written with comma decimals and dot thousands
/// (`"1.234,5"` → `1234.5`, `"1.234"` → `1234`). Dots are always
/// separators in text; JSON numbers go through [`decimal_from_json`].
pub fn parse_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace('.', "")
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Numeric value of a JSON number or decimal string.
pub fn decimal_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(decimal_from_json(&value))
}

/// SHA-256 hex digest of a parameter file's bytes.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// ZoneParameters
// ---------------------------------------------------------------------------

/// Numeric envelope of one zone. `None` means "not regulated".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneParameters {
    #[serde(rename = "CA_min", default, deserialize_with = "lenient_decimal", skip_serializing_if = "Option::is_none")]
    pub ca_min: Option<f64>,
    #[serde(rename = "CA_bas", default, deserialize_with = "lenient_decimal", skip_serializing_if = "Option::is_none")]
    pub ca_bas: Option<f64>,
    #[serde(rename = "CA_max", default, deserialize_with = "lenient_decimal", skip_serializing_if = "Option::is_none")]
    pub ca_max: Option<f64>,
    #[serde(rename = "Tperm", default, deserialize_with = "lenient_decimal", skip_serializing_if = "Option::is_none")]
    pub tperm: Option<f64>,
    #[serde(rename = "Tocup", default, deserialize_with = "lenient_decimal", skip_serializing_if = "Option::is_none")]
    pub tocup: Option<f64>,
    #[serde(rename = "Npav_bas", default, deserialize_with = "lenient_decimal", skip_serializing_if = "Option::is_none")]
    pub npav_bas: Option<f64>,
    #[serde(rename = "Npav_max", default, deserialize_with = "lenient_decimal", skip_serializing_if = "Option::is_none")]
    pub npav_max: Option<f64>,
    #[serde(rename = "Gab_bas", default, deserialize_with = "lenient_decimal", skip_serializing_if = "Option::is_none")]
    pub gab_bas: Option<f64>,
    #[serde(rename = "Gab_max", default, deserialize_with = "lenient_decimal", skip_serializing_if = "Option::is_none")]
    pub gab_max: Option<f64>,
    /// Jurisdiction-specific fields (setbacks, parking minimums, ...).
    #[serde(flatten)]
    pub extras: IndexMap<String, Value>,
}

impl ZoneParameters {
    /// Occupancy and permeability limits are stored either as fractions or as
    /// percentages; values above 1 are read as percentages.
    pub fn ratio(value: f64) -> f64 {
        if value > 1.0 {
            value / 100.0
        } else {
            value
        }
    }
}

/// One zone as it appears in the file, plus its parsed numeric envelope.
/// `raw` is what gets written back, so unparseable values, key order and
/// string formatting survive a load/save cycle.
#[derive(Debug, Clone, PartialEq)]
struct ZoneEntry {
    raw: IndexMap<String, Value>,
    parameters: ZoneParameters,
}

impl ZoneEntry {
    fn from_raw(code: &str, raw: IndexMap<String, Value>) -> ZoniResult<Self> {
        let parameters = match raw.get(INDICES_KEY) {
            Some(indices) => ZoneParameters::deserialize(indices).map_err(|e| {
                ZoniError::ParameterTable(format!("zone {code}: invalid indices: {e}"))
            })?,
            None => ZoneParameters::default(),
        };
        Ok(Self { raw, parameters })
    }

    fn from_parameters(parameters: ZoneParameters) -> Self {
        let mut raw = IndexMap::new();
        raw.insert(
            INDICES_KEY.to_string(),
            serde_json::to_value(&parameters).unwrap_or_default(),
        );
        Self { raw, parameters }
    }
}

// ---------------------------------------------------------------------------
// ParameterTable
// ---------------------------------------------------------------------------

/// Read-only parameter table keyed by zone code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    zones: IndexMap<String, ZoneEntry>,
    fingerprint: String,
}

impl ParameterTable {
    pub fn from_json_str(text: &str) -> ZoniResult<Self> {
        let raw: IndexMap<String, IndexMap<String, Value>> =
            serde_json::from_str(text).map_err(|e| ZoniError::ParameterTable(e.to_string()))?;
        let zones = raw
            .into_iter()
            .map(|(code, entry)| {
                let entry = ZoneEntry::from_raw(&code, entry)?;
                Ok((code, entry))
            })
            .collect::<ZoniResult<IndexMap<String, ZoneEntry>>>()?;
        Ok(Self {
            zones,
            fingerprint: fingerprint_bytes(text.as_bytes()),
        })
    }

    pub fn load(path: &Path) -> ZoniResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ZoniError::ParameterTable(format!("cannot read {}: {e}", path.display()))
        })?;
        let table = Self::from_json_str(&text)?;
        tracing::info!(
            path = %path.display(),
            zones = table.len(),
            fingerprint = %&table.fingerprint[..12],
            "parameter table loaded"
        );
        Ok(table)
    }

    /// Build from already-parsed parameters (tests, in-process hosts).
    pub fn from_parameters(entries: impl IntoIterator<Item = (String, ZoneParameters)>) -> Self {
        let zones: IndexMap<String, ZoneEntry> = entries
            .into_iter()
            .map(|(code, parameters)| (code, ZoneEntry::from_parameters(parameters)))
            .collect();
        let mut table = Self {
            zones,
            fingerprint: String::new(),
        };
        table.fingerprint = table
            .to_json()
            .map(|text| fingerprint_bytes(text.as_bytes()))
            .unwrap_or_default();
        table
    }

    pub fn to_json(&self) -> ZoniResult<String> {
        let raw: IndexMap<&str, &IndexMap<String, Value>> = self
            .zones
            .iter()
            .map(|(code, entry)| (code.as_str(), &entry.raw))
            .collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    /// Exact code first, then a trimmed case-insensitive match.
    pub fn get(&self, zone_code: &str) -> Option<&ZoneParameters> {
        if let Some(entry) = self.zones.get(zone_code) {
            return Some(&entry.parameters);
        }
        let wanted = normalize_code(zone_code);
        self.zones
            .iter()
            .find(|(code, _)| normalize_code(code) == wanted)
            .map(|(_, entry)| &entry.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "MUQ2": {
            "indices": {"CA_min": "0,1", "CA_bas": "1,0", "CA_max": "1.234,5", "Tocup": 60,
                        "Tperm": "20", "Npav_max": "n/a", "recuo_frontal": "4,00 m"},
            "observacao": "ver nota 12"
        },
        "ZE1": {"indices": {"CA_max": 1.0}}
    }"#;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1.234,5"), Some(1234.5));
        assert_eq!(parse_decimal("0,6"), Some(0.6));
        assert_eq!(parse_decimal("1.234"), Some(1234.0));
        assert_eq!(parse_decimal("1.000.000"), Some(1_000_000.0));
        assert_eq!(parse_decimal(" 3 "), Some(3.0));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn test_table_parses_numeric_indices() {
        let table = ParameterTable::from_json_str(TABLE).unwrap();
        let muq2 = table.get("MUQ2").unwrap();
        assert_eq!(muq2.ca_min, Some(0.1));
        assert_eq!(muq2.ca_max, Some(1234.5));
        assert_eq!(muq2.tocup, Some(60.0));
        assert_eq!(muq2.npav_max, None);
        assert_eq!(muq2.gab_max, None);
        assert_eq!(muq2.extras["recuo_frontal"], serde_json::json!("4,00 m"));
        assert_eq!(table.get(" ze1 ").unwrap().ca_max, Some(1.0));
        assert!(table.get("MUQ9").is_none());
        assert_eq!(table.codes().collect::<Vec<_>>(), vec!["MUQ2", "ZE1"]);
    }

    #[test]
    fn test_table_round_trips_extras() {
        let table = ParameterTable::from_json_str(TABLE).unwrap();
        let text = table.to_json().unwrap();
        assert!(text.contains("observacao"));
        let again = ParameterTable::from_json_str(&text).unwrap();
        assert_eq!(again.get("MUQ2"), table.get("MUQ2"));
        assert_eq!(again.len(), 2);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let keys: Vec<&String> = value["MUQ2"]["indices"].as_object().unwrap().keys().collect();
        assert_eq!(keys.last().unwrap().as_str(), "recuo_frontal");
    }

    #[test]
    fn test_table_writes_back_file_values_unchanged() {
        let text = r#"{"MUQ2":{"indices":{"Tocup":"60","Tperm":"20","Npav_max":"n/a","CA_max":1.5}}}"#;
        let table = ParameterTable::from_json_str(text).unwrap();
        let muq2 = table.get("MUQ2").unwrap();
        assert_eq!(muq2.tocup, Some(60.0));
        assert_eq!(muq2.npav_max, None);

        let written: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();
        assert_eq!(serde_json::to_string(&written).unwrap(), text);
        let keys: Vec<&String> = written["MUQ2"]["indices"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["Tocup", "Tperm", "Npav_max", "CA_max"]);
    }

    #[test]
    fn test_non_object_indices_are_rejected() {
        assert!(matches!(
            ParameterTable::from_json_str(r#"{"MUQ2": {"indices": [1, 2]}}"#),
            Err(ZoniError::ParameterTable(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = ParameterTable::from_json_str(TABLE).unwrap();
        let b = ParameterTable::from_json_str(&TABLE.replace("60", "70")).unwrap();
        assert_eq!(a.fingerprint().len(), 64);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_malformed_table_is_parameter_error() {
        assert!(matches!(
            ParameterTable::from_json_str("[1, 2]"),
            Err(ZoniError::ParameterTable(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ParameterTable::load(&dir.path().join("missing.json")),
            Err(ZoniError::ParameterTable(_))
        ));
    }

    #[test]
    fn test_ratio_reads_percentages() {
        assert_eq!(ZoneParameters::ratio(60.0), 0.6);
        assert_eq!(ZoneParameters::ratio(0.6), 0.6);
    }
}
