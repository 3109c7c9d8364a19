//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that make up a record key. Each type
//! validates its format on construction so downstream code can compare and
//! hash them without re-checking.

use super::units::Dimension;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source key newtype wrapper
///
/// Stable identity of a configured source. Lowercase ASCII letters, digits,
/// `_` and `-` only, since it is also used as a file name.
///
/// # Examples
///
/// ```
/// use gridstats::domain::ids::SourceKey;
/// use std::str::FromStr;
///
/// let key = SourceKey::from_str("ember_monthly").unwrap();
/// assert_eq!(key.as_str(), "ember_monthly");
/// assert!(SourceKey::from_str("Ember Monthly").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceKey(String);

impl SourceKey {
    /// Creates a new SourceKey from a string
    pub fn new(key: impl Into<String>) -> Result<Self, String> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err("Source key cannot be empty".to_string());
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(format!(
                "Invalid source key '{key}'. Use lowercase letters, digits, '_' or '-'"
            ));
        }
        Ok(Self(key))
    }

    /// Returns the source key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SourceKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourceKey> for String {
    fn from(key: SourceKey) -> Self {
        key.0
    }
}

impl AsRef<str> for SourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// ISO 3166-1 alpha-3 country code
///
/// Input is upper-cased, so `"deu"` and `"DEU"` are the same code.
///
/// # Examples
///
/// ```
/// use gridstats::domain::ids::CountryCode;
///
/// let code = CountryCode::new("deu").unwrap();
/// assert_eq!(code.as_str(), "DEU");
/// assert!(CountryCode::new("DE").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Creates a new CountryCode, normalising to upper case
    pub fn new(code: impl Into<String>) -> Result<Self, String> {
        let code = code.into().trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(format!(
                "Invalid country code '{code}'. Expected ISO 3166-1 alpha-3 (e.g. DEU)"
            ));
        }
        Ok(Self(code))
    }

    /// Returns the country code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CountryCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CountryCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Metric identifier
///
/// Dot-separated lowercase segments, e.g. `electricity.generation.solar`.
/// The second segment is the metric's family and decides what it measures:
/// `share` is a percentage, a `_yoy` suffix a change against the previous
/// year and a `_ttm` suffix a trailing twelve-month sum.
///
/// # Examples
///
/// ```
/// use gridstats::domain::ids::MetricId;
///
/// let metric = MetricId::new("electricity.share.wind").unwrap();
/// assert!(metric.is_share());
///
/// let wind = MetricId::new("electricity.generation.wind").unwrap();
/// assert_eq!(wind.variant("yoy").unwrap().as_str(), "electricity.generation_yoy.wind");
/// assert!(MetricId::new("Electricity Generation").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetricId(String);

impl MetricId {
    /// Creates a new MetricId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.is_empty() {
            return Err("Metric ID cannot be empty".to_string());
        }
        let valid = id.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        });
        if !valid {
            return Err(format!(
                "Invalid metric ID '{id}'. Expected dot-separated lowercase segments"
            ));
        }
        Ok(Self(id))
    }

    /// Builds `{prefix}.{slug}` where `slug` is free text to be slugified
    pub fn with_slug(prefix: &str, label: &str) -> Result<Self, String> {
        Self::new(format!("{prefix}.{}", slugify(label)))
    }

    /// Returns the metric ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The family segment: the second one, or the only one
    pub fn family(&self) -> &str {
        let mut segments = self.0.split('.');
        let first = segments.next().unwrap_or_default();
        segments.next().unwrap_or(first)
    }

    /// What a value of this metric measures
    pub fn dimension(&self) -> Dimension {
        let family = self.family();
        if family.ends_with("_yoy") {
            Dimension::Change
        } else if family == "share" || family.starts_with("share_") {
            Dimension::Share
        } else {
            Dimension::Energy
        }
    }

    /// Whether this metric is a percentage share rather than an energy quantity
    pub fn is_share(&self) -> bool {
        self.dimension() == Dimension::Share
    }

    /// Whether values for consecutive periods may be summed
    pub fn is_additive(&self) -> bool {
        self.dimension() == Dimension::Energy && !self.family().ends_with("_ttm")
    }

    /// The same metric with `_{suffix}` appended to its family
    pub fn variant(&self, suffix: &str) -> Result<Self, String> {
        let family = self.family();
        let (head, tail) = match self.0.split_once('.') {
            Some((first, rest)) if rest.starts_with(family) => (
                format!("{first}."),
                rest[family.len()..].to_string(),
            ),
            _ => (String::new(), self.0[family.len()..].to_string()),
        };
        Self::new(format!("{head}{family}_{suffix}{tail}"))
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MetricId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MetricId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MetricId> for String {
    fn from(id: MetricId) -> Self {
        id.0
    }
}

impl AsRef<str> for MetricId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns a free-text label into a metric segment
///
/// `"Other Renewables"` becomes `other_renewables`; `"Coal, peat and oil shale"`
/// becomes `coal_peat_and_oil_shale`.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}
