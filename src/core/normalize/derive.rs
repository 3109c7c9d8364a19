//! Derived metrics computed from adapted records before reconciliation
//!
//! Roll-ups come first so that trends also cover derived annual series, and
//! low-carbon shares come last so they see derived totals of every kind.

use super::mix::derive_low_carbon_shares;
use super::rollup::derive_annual_totals;
use super::trends::derive_trends;
use crate::config::schema::ReconcileConfig;
use crate::domain::record::CanonicalRecord;

/// Which derivations run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeriveOptions {
    pub annual_totals: bool,
    pub trends: bool,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

impl From<&ReconcileConfig> for DeriveOptions {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            annual_totals: config.derive_annual_totals,
            trends: config.derive_trends,
        }
    }
}

/// Derived records for `records`; the input is left untouched
pub fn derive_metrics(records: &[CanonicalRecord], options: DeriveOptions) -> Vec<CanonicalRecord> {
    let mut derived = Vec::new();
    if options.annual_totals {
        derived.extend(derive_annual_totals(records));
    }
    if options.trends {
        let trends = derive_trends(records.iter().chain(&derived));
        derived.extend(trends);
    }
    let shares = derive_low_carbon_shares(records.iter().chain(&derived));
    derived.extend(shares);
    derived
}
