use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical season identity (`YYYY/YY`).
///
/// Built only through [`normalize`], so two keys compare equal exactly when
/// their source strings describe the same season. Strings that are not a
/// year pair are kept verbatim and compared literally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeasonKey(String);

impl SeasonKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_year_pair(&self) -> bool {
        parse_year_pair(&self.0).is_some()
    }

    pub fn start_year(&self) -> Option<u16> {
        start_year(&self.0)
    }
}

impl fmt::Display for SeasonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SeasonKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SeasonKey {
    fn from(raw: &str) -> Self {
        normalize(raw)
    }
}

impl From<String> for SeasonKey {
    fn from(raw: String) -> Self {
        normalize(&raw)
    }
}

impl Serialize for SeasonKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SeasonKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(normalize(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct YearPair {
    start: u16,
    end2: u8,
}

impl YearPair {
    fn end4(self) -> u16 {
        let century = self.start / 100 * 100;
        let mut end = century + u16::from(self.end2);
        // 1999/00 rolls into the next century.
        if end < self.start {
            end += 100;
        }
        end
    }
}

fn parse_year_pair(raw: &str) -> Option<YearPair> {
    let trimmed = raw.trim();
    let sep = trimmed.find(['/', '-'])?;
    let (start, rest) = trimmed.split_at(sep);
    let end = &rest[1..];
    if start.len() != 4 || !start.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !matches!(end.len(), 2 | 4) || !end.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let start = start.parse::<u16>().ok()?;
    let end2 = end[end.len() - 2..].parse::<u8>().ok()?;
    Some(YearPair { start, end2 })
}

/// Canonicalize a raw season string. Total and idempotent.
pub fn normalize(raw: &str) -> SeasonKey {
    match parse_year_pair(raw) {
        Some(pair) => SeasonKey(format!("{}/{:02}", pair.start, pair.end2)),
        None => SeasonKey(raw.to_string()),
    }
}

/// Same canonical pair joined with `-`, for exact-match lookups.
pub fn to_dash_form(raw: &str) -> String {
    match parse_year_pair(raw) {
        Some(pair) => format!("{}-{:02}", pair.start, pair.end2),
        None => raw.to_string(),
    }
}

pub fn equals(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Every textual form upstream writers have used for the same season.
///
/// Stores that only filter by literal equality get an OR over these.
pub fn expand_variants(raw: &str) -> Vec<String> {
    let Some(pair) = parse_year_pair(raw) else {
        return vec![raw.to_string()];
    };
    let end4 = pair.end4();
    vec![
        format!("{}/{:02}", pair.start, pair.end2),
        format!("{}-{:02}", pair.start, pair.end2),
        format!("{}/{}", pair.start, end4),
        format!("{}-{}", pair.start, end4),
    ]
}

pub fn start_year(raw: &str) -> Option<u16> {
    parse_year_pair(raw).map(|pair| pair.start)
}

/// True when any textual variant of `raw` is one of `targets`.
pub fn matches_any(raw: &str, targets: &[String]) -> bool {
    expand_variants(raw)
        .iter()
        .any(|variant| targets.iter().any(|t| t == variant))
}
