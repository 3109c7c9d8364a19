//! Normalization shared by all adapters: country resolution, generation mix
//! totals and the derived metrics (annual roll-ups, trends, low-carbon
//! shares). Unit and period normalization live with their domain types.

pub mod countries;
pub mod derive;
pub mod mix;
pub mod rollup;
pub mod trends;

pub use countries::CountryResolver;
pub use derive::{derive_metrics, DeriveOptions};
pub use mix::GenerationMix;
pub use rollup::derive_annual_totals;
pub use trends::derive_trends;
