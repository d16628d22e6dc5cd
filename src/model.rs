//! Value records returned by lookups
//!
//! All three record types are plain immutable data. Country codes and names
//! always reference the process-wide table in [`crate::country`], so they are
//! `&'static str`; strings decoded out of leaf records are owned. Fields that
//! the database does not populate stay at their `Default` values (empty
//! strings, zeroes).

use serde::Serialize;

/// A country, as an ISO-3166 alpha-2 code and an English display name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Country {
    /// Two-letter country code, `"--"` when unknown
    pub code: &'static str,
    /// Display name, `"N/A"` when unknown
    pub name: &'static str,
}

/// Sentinel returned whenever an address cannot be resolved to a country
pub const UNKNOWN_COUNTRY: Country = Country {
    code: "--",
    name: "N/A",
};

/// A region lookup result (region editions only)
///
/// `region` holds the two-letter US state or Canadian province code when the
/// database carries one, and is empty otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Region {
    /// Country code, empty when the index falls outside every known range
    pub country_code: &'static str,
    /// Country display name
    pub country_name: &'static str,
    /// Two uppercase ASCII letters, or empty
    pub region: String,
}

/// A city-level lookup result (City editions only)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Location {
    /// Country code from the leading index byte of the leaf record
    pub country_code: &'static str,
    /// Country display name
    pub country_name: &'static str,
    /// Region code, empty when absent
    pub region: String,
    /// City name (ISO-8859-1 in the file), empty when absent
    pub city: String,
    /// Postal code, empty when absent
    pub postal_code: String,
    /// Degrees latitude, south negative
    pub latitude: f32,
    /// Degrees longitude, west negative
    pub longitude: f32,
    /// US DMA code, 0 outside the US
    pub dma_code: i32,
    /// Same value as `dma_code`
    pub metro_code: i32,
    /// US telephone area code, 0 outside the US
    pub area_code: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_country_sentinel() {
        assert_eq!(UNKNOWN_COUNTRY.code, "--");
        assert_eq!(UNKNOWN_COUNTRY.name, "N/A");
    }

    #[test]
    fn default_records_are_empty() {
        let region = Region::default();
        assert_eq!(region.country_code, "");
        assert!(region.region.is_empty());

        let location = Location::default();
        assert_eq!(location.latitude, 0.0);
        assert_eq!(location.dma_code, 0);
        assert!(location.city.is_empty());
    }
}
