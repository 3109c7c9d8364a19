//! Source adapters
//!
//! A flat registry of interchangeable parsers keyed by [`AdapterKind`]:
//!
//! - [`ember`] - Ember monthly electricity generation JSON
//! - [`iea`] - IEA World Energy Balances wide CSV
//! - [`tabular`] - long-format CSV with a configurable column mapping

pub mod ember;
pub mod iea;
pub mod tabular;
pub mod traits;

pub use ember::EmberMonthlyAdapter;
pub use iea::IeaBalancesAdapter;
pub use tabular::TabularCsvAdapter;
pub use traits::SourceAdapter;

use crate::domain::source::AdapterKind;

static EMBER_MONTHLY: EmberMonthlyAdapter = EmberMonthlyAdapter;
static IEA_BALANCES: IeaBalancesAdapter = IeaBalancesAdapter;
static TABULAR_CSV: TabularCsvAdapter = TabularCsvAdapter;

/// The adapter registered for `kind`
pub fn adapter_for(kind: AdapterKind) -> &'static dyn SourceAdapter {
    match kind {
        AdapterKind::EmberMonthly => &EMBER_MONTHLY,
        AdapterKind::IeaBalances => &IEA_BALANCES,
        AdapterKind::TabularCsv => &TABULAR_CSV,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_kind() {
        for kind in [
            AdapterKind::EmberMonthly,
            AdapterKind::IeaBalances,
            AdapterKind::TabularCsv,
        ] {
            assert_eq!(adapter_for(kind).kind(), kind);
        }
    }
}
