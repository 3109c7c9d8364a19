//! Units of measure and conversion
//!
//! Energy quantities are stored in TWh, shares in percent and period-over-period
//! changes in percent change. Every other unit converts into one of those
//! canonical units through a fixed factor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 1 TWh expressed in PJ
const PJ_PER_TWH: f64 = 3.6;
/// 1 ktoe expressed in TWh
const TWH_PER_KTOE: f64 = 0.01163;

/// Physical dimension of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// An amount of energy
    Energy,
    /// A percentage of some total
    Share,
    /// Relative change against an earlier period, in percent
    Change,
}

impl Dimension {
    /// The unit every value of this dimension is stored in
    pub fn canonical_unit(&self) -> Unit {
        match self {
            Dimension::Energy => Unit::TerawattHours,
            Dimension::Share => Unit::Percent,
            Dimension::Change => Unit::PercentChange,
        }
    }
}

/// Supported units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "TWh")]
    TerawattHours,
    #[serde(rename = "GWh")]
    GigawattHours,
    #[serde(rename = "MWh")]
    MegawattHours,
    #[serde(rename = "PJ")]
    Petajoules,
    #[serde(rename = "ktoe")]
    Ktoe,
    #[serde(rename = "Mtoe")]
    Mtoe,
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "pct_change")]
    PercentChange,
}

impl Unit {
    /// Short display symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::TerawattHours => "TWh",
            Unit::GigawattHours => "GWh",
            Unit::MegawattHours => "MWh",
            Unit::Petajoules => "PJ",
            Unit::Ktoe => "ktoe",
            Unit::Mtoe => "Mtoe",
            Unit::Percent => "%",
            Unit::PercentChange => "% chg",
        }
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            Unit::Percent => Dimension::Share,
            Unit::PercentChange => Dimension::Change,
            _ => Dimension::Energy,
        }
    }

    /// Multiplier that converts a value in this unit into the canonical unit
    fn canonical_factor(&self) -> f64 {
        match self {
            Unit::TerawattHours => 1.0,
            Unit::GigawattHours => 1e-3,
            Unit::MegawattHours => 1e-6,
            Unit::Petajoules => 1.0 / PJ_PER_TWH,
            Unit::Ktoe => TWH_PER_KTOE,
            Unit::Mtoe => TWH_PER_KTOE * 1000.0,
            Unit::Percent | Unit::PercentChange => 1.0,
        }
    }

    /// Whether this unit is already the canonical one for its dimension
    pub fn is_canonical(&self) -> bool {
        self.dimension().canonical_unit() == *self
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twh" => Ok(Unit::TerawattHours),
            "gwh" => Ok(Unit::GigawattHours),
            "mwh" => Ok(Unit::MegawattHours),
            "pj" => Ok(Unit::Petajoules),
            "ktoe" => Ok(Unit::Ktoe),
            "mtoe" => Ok(Unit::Mtoe),
            "%" | "pct" | "percent" => Ok(Unit::Percent),
            "pct_change" | "% chg" | "percent_change" => Ok(Unit::PercentChange),
            other => Err(format!(
                "Unknown unit '{other}'. Must be one of: TWh, GWh, MWh, PJ, ktoe, Mtoe, %, pct_change"
            )),
        }
    }
}

/// Converts `value` from one unit to another of the same dimension
///
/// # Errors
///
/// Returns an error when the two units measure different dimensions.
///
/// # Examples
///
/// ```
/// use gridstats::domain::units::{convert, Unit};
///
/// let twh = convert(36.0, Unit::Petajoules, Unit::TerawattHours).unwrap();
/// assert!((twh - 10.0).abs() < 1e-9);
/// assert!(convert(1.0, Unit::Percent, Unit::TerawattHours).is_err());
/// ```
pub fn convert(value: f64, from: Unit, to: Unit) -> Result<f64, String> {
    if from == to {
        return Ok(value);
    }
    if from.dimension() != to.dimension() {
        return Err(format!(
            "Cannot convert {from} to {to}: incompatible dimensions"
        ));
    }
    Ok(value * from.canonical_factor() / to.canonical_factor())
}

/// Converts `value` into the canonical unit for `unit`'s dimension
pub fn to_canonical(value: f64, unit: Unit) -> (f64, Unit) {
    let target = unit.dimension().canonical_unit();
    (value * unit.canonical_factor(), target)
}
