//! Zone-code → category lookup table.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{ZoniError, ZoniResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneCategory {
    Special,
    Axis,
    SemiAxis,
    EnvironmentalMacro,
    UrbanMacro,
    Ordinary,
}

impl ZoneCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneCategory::Special => "special",
            ZoneCategory::Axis => "axis",
            ZoneCategory::SemiAxis => "semi_axis",
            ZoneCategory::EnvironmentalMacro => "environmental_macro",
            ZoneCategory::UrbanMacro => "urban_macro",
            ZoneCategory::Ordinary => "ordinary",
        }
    }

    pub fn is_macro(&self) -> bool {
        matches!(self, ZoneCategory::UrbanMacro | ZoneCategory::EnvironmentalMacro)
    }
}

/// Prefix patterns, evaluated top to bottom against the normalized code;
/// first match wins. Suffixes (`MEU2`, `EA-1`) keep the prefix's category.
/// Semi-axis is tested before axis because `SEMIEIXO` contains `EIXO`.
static CATEGORY_PATTERNS: LazyLock<Vec<(Regex, ZoneCategory)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"^(ZE|SETOR)").unwrap(), ZoneCategory::Special),
        (Regex::new(r"^SEMI").unwrap(), ZoneCategory::SemiAxis),
        (Regex::new(r"^(EU[1-4]|EA|EO|EM)|EIXO").unwrap(), ZoneCategory::Axis),
        (Regex::new(r"^(MUPA|MRO|MRPA)").unwrap(), ZoneCategory::EnvironmentalMacro),
        (
            Regex::new(r"^(MUQ|MEU|MUIS|MUCON|MUO|MACRO|MZ)").unwrap(),
            ZoneCategory::UrbanMacro,
        ),
    ]
});

/// Trimmed, upper-cased zone code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Category of a zone code, or `UnclassifiableZone` when no pattern matches.
pub fn try_classify_zone_code(code: &str) -> ZoniResult<ZoneCategory> {
    let normalized = normalize_code(code);
    CATEGORY_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&normalized))
        .map(|(_, category)| *category)
        .ok_or_else(|| ZoniError::UnclassifiableZone(code.trim().to_string()))
}

/// Category of a zone code; unmatched codes are `Ordinary`.
pub fn classify_zone_code(code: &str) -> ZoneCategory {
    try_classify_zone_code(code).unwrap_or(ZoneCategory::Ordinary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table() {
        let cases = [
            ("ZE1", ZoneCategory::Special),
            ("ZEOT2", ZoneCategory::Special),
            ("SETOR_MINERACAO", ZoneCategory::Special),
            ("EU1", ZoneCategory::Axis),
            ("EIXOORLA", ZoneCategory::Axis),
            ("EIXOACESSO", ZoneCategory::Axis),
            ("SEMIEIXO", ZoneCategory::SemiAxis),
            ("MUPA1", ZoneCategory::EnvironmentalMacro),
            ("MRPA", ZoneCategory::EnvironmentalMacro),
            ("MRO", ZoneCategory::EnvironmentalMacro),
            ("MUQ2", ZoneCategory::UrbanMacro),
            ("MUO", ZoneCategory::UrbanMacro),
            ("MUCON", ZoneCategory::UrbanMacro),
            ("MEU", ZoneCategory::UrbanMacro),
            ("MUIS", ZoneCategory::UrbanMacro),
            ("ZR1", ZoneCategory::Ordinary),
        ];
        for (code, expected) in cases {
            assert_eq!(classify_zone_code(code), expected, "code {code}");
        }
    }

    #[test]
    fn test_suffixed_codes_keep_prefix_category() {
        let cases = [
            ("MEU2", ZoneCategory::UrbanMacro),
            ("MUIS-A", ZoneCategory::UrbanMacro),
            ("MUQ2A", ZoneCategory::UrbanMacro),
            ("EA-1", ZoneCategory::Axis),
            ("EU3B", ZoneCategory::Axis),
            ("EO2", ZoneCategory::Axis),
            ("MRO-1", ZoneCategory::EnvironmentalMacro),
            ("ZEIS3", ZoneCategory::Special),
            ("SEMIEIXO2", ZoneCategory::SemiAxis),
        ];
        for (code, expected) in cases {
            assert_eq!(try_classify_zone_code(code).unwrap(), expected, "code {code}");
        }
    }

    #[test]
    fn test_codes_are_normalized() {
        assert_eq!(classify_zone_code("  muq3 "), ZoneCategory::UrbanMacro);
        assert_eq!(classify_zone_code("eu2"), ZoneCategory::Axis);
    }

    #[test]
    fn test_unmatched_codes_report_unclassifiable() {
        assert!(matches!(
            try_classify_zone_code("XYZ"),
            Err(ZoniError::UnclassifiableZone(ref c)) if c == "XYZ"
        ));
        assert_eq!(classify_zone_code(""), ZoneCategory::Ordinary);
        assert_eq!(classify_zone_code("EUROPA"), ZoneCategory::Ordinary);
        assert_eq!(classify_zone_code("EU5"), ZoneCategory::Ordinary);
    }
}
