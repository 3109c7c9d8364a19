//! Country name resolution
//!
//! Sources name countries in their own ways ("Korea", "Republic of Turkiye",
//! "Viet Nam"). Everything is mapped onto ISO 3166-1 alpha-3 codes; rows for
//! regions, aggregates or unknown names resolve to `None` and are skipped by
//! the adapters.

use crate::domain::ids::CountryCode;
use crate::domain::Result;
use crate::domain::GridError;
use std::collections::{BTreeMap, HashMap};

/// (ISO3 code, canonical English name)
const COUNTRIES: &[(&str, &str)] = &[
    ("ARG", "Argentina"),
    ("ARM", "Armenia"),
    ("AUS", "Australia"),
    ("AUT", "Austria"),
    ("AZE", "Azerbaijan"),
    ("BGD", "Bangladesh"),
    ("BLR", "Belarus"),
    ("BEL", "Belgium"),
    ("BOL", "Bolivia"),
    ("BIH", "Bosnia and Herzegovina"),
    ("BRA", "Brazil"),
    ("BGR", "Bulgaria"),
    ("CAN", "Canada"),
    ("CHL", "Chile"),
    ("CHN", "China"),
    ("COL", "Colombia"),
    ("CRI", "Costa Rica"),
    ("HRV", "Croatia"),
    ("CYP", "Cyprus"),
    ("CZE", "Czechia"),
    ("DNK", "Denmark"),
    ("DOM", "Dominican Republic"),
    ("ECU", "Ecuador"),
    ("EGY", "Egypt"),
    ("SLV", "El Salvador"),
    ("EST", "Estonia"),
    ("FIN", "Finland"),
    ("FRA", "France"),
    ("GEO", "Georgia"),
    ("DEU", "Germany"),
    ("GRC", "Greece"),
    ("HUN", "Hungary"),
    ("ISL", "Iceland"),
    ("IND", "India"),
    ("IDN", "Indonesia"),
    ("IRN", "Iran"),
    ("IRQ", "Iraq"),
    ("IRL", "Ireland"),
    ("ISR", "Israel"),
    ("ITA", "Italy"),
    ("JPN", "Japan"),
    ("KAZ", "Kazakhstan"),
    ("KEN", "Kenya"),
    ("XKX", "Kosovo"),
    ("KWT", "Kuwait"),
    ("KGZ", "Kyrgyzstan"),
    ("LVA", "Latvia"),
    ("LTU", "Lithuania"),
    ("LUX", "Luxembourg"),
    ("MYS", "Malaysia"),
    ("MLT", "Malta"),
    ("MEX", "Mexico"),
    ("MDA", "Moldova"),
    ("MNG", "Mongolia"),
    ("MNE", "Montenegro"),
    ("MAR", "Morocco"),
    ("MMR", "Myanmar"),
    ("NLD", "Netherlands"),
    ("NZL", "New Zealand"),
    ("NGA", "Nigeria"),
    ("MKD", "North Macedonia"),
    ("NOR", "Norway"),
    ("OMN", "Oman"),
    ("PAK", "Pakistan"),
    ("PER", "Peru"),
    ("PHL", "Philippines"),
    ("POL", "Poland"),
    ("PRT", "Portugal"),
    ("PRI", "Puerto Rico"),
    ("QAT", "Qatar"),
    ("ROU", "Romania"),
    ("RUS", "Russia"),
    ("SAU", "Saudi Arabia"),
    ("SRB", "Serbia"),
    ("SGP", "Singapore"),
    ("SVK", "Slovakia"),
    ("SVN", "Slovenia"),
    ("ZAF", "South Africa"),
    ("KOR", "South Korea"),
    ("ESP", "Spain"),
    ("LKA", "Sri Lanka"),
    ("SWE", "Sweden"),
    ("CHE", "Switzerland"),
    ("TWN", "Taiwan"),
    ("TJK", "Tajikistan"),
    ("THA", "Thailand"),
    ("TUN", "Tunisia"),
    ("TUR", "Turkey"),
    ("UKR", "Ukraine"),
    ("ARE", "United Arab Emirates"),
    ("GBR", "United Kingdom"),
    ("USA", "United States"),
    ("URY", "Uruguay"),
    ("UZB", "Uzbekistan"),
    ("VNM", "Vietnam"),
];

/// Alternate spellings used by upstream publishers
const ALIASES: &[(&str, &str)] = &[
    ("Bosnia Herzegovina", "BIH"),
    ("Czech Republic", "CZE"),
    ("People's Republic of China", "CHN"),
    ("Republic of Turkiye", "TUR"),
    ("Türkiye", "TUR"),
    ("Turkiye", "TUR"),
    ("Slovak Republic", "SVK"),
    ("Korea", "KOR"),
    ("Republic of Korea", "KOR"),
    ("Taiwan (China)", "TWN"),
    ("Chinese Taipei", "TWN"),
    ("The Philippines", "PHL"),
    ("Viet Nam", "VNM"),
    ("Russian Federation", "RUS"),
    ("Republic of Moldova", "MDA"),
    ("Islamic Republic of Iran", "IRN"),
    ("United States of America", "USA"),
    ("UK", "GBR"),
    ("Republic of North Macedonia", "MKD"),
];

/// Lowercase, strip punctuation and collapse whitespace
fn normalize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Maps country names and codes onto [`CountryCode`]s
#[derive(Debug, Clone)]
pub struct CountryResolver {
    by_name: HashMap<String, CountryCode>,
    known_codes: HashMap<String, CountryCode>,
}

impl CountryResolver {
    /// Built-in names plus `extra_aliases` (name -> ISO3), which win on clashes
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an alias targets a malformed code
    pub fn new(extra_aliases: &BTreeMap<String, String>) -> Result<Self> {
        let mut by_name = HashMap::new();
        let mut known_codes = HashMap::new();

        for (code, name) in COUNTRIES {
            let code = CountryCode::new(*code).map_err(GridError::Configuration)?;
            by_name.insert(normalize_name(name), code.clone());
            known_codes.insert(code.as_str().to_string(), code);
        }
        for (alias, code) in ALIASES {
            let code = CountryCode::new(*code).map_err(GridError::Configuration)?;
            by_name.insert(normalize_name(alias), code);
        }
        for (alias, code) in extra_aliases {
            let code = CountryCode::new(code.as_str()).map_err(|e| {
                GridError::Configuration(format!("normalize.country_aliases['{alias}']: {e}"))
            })?;
            known_codes.insert(code.as_str().to_string(), code.clone());
            by_name.insert(normalize_name(alias), code);
        }

        Ok(Self {
            by_name,
            known_codes,
        })
    }

    /// Resolver with only the built-in names
    pub fn builtin() -> Self {
        // Built-in table entries are all well-formed codes
        Self::new(&BTreeMap::new()).unwrap_or_else(|_| Self {
            by_name: HashMap::new(),
            known_codes: HashMap::new(),
        })
    }

    /// Resolve a country name or ISO3 code
    pub fn resolve(&self, raw: &str) -> Option<CountryCode> {
        let trimmed = raw.trim();
        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            if let Some(code) = self.known_codes.get(&trimmed.to_ascii_uppercase()) {
                return Some(code.clone());
            }
        }
        self.by_name.get(&normalize_name(trimmed)).cloned()
    }

    /// Number of distinct codes known
    pub fn len(&self) -> usize {
        self.known_codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_codes.is_empty()
    }
}

impl Default for CountryResolver {
    fn default() -> Self {
        Self::builtin()
    }
}
