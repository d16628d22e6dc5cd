//! Leaf-record decoding
//!
//! A terminal pointer either encodes a small index directly (country and
//! region editions, by offset arithmetic against the segment base) or
//! addresses a variable-length leaf record in the file (city and org-family
//! editions). Leaf strings are NUL-terminated ISO-8859-1; coordinates and
//! the US metro triple are 3-byte little-endian integers.

use crate::country::country_at;
use crate::metadata::{DatabaseInfo, Edition, COUNTRY_BEGIN, STATE_BEGIN_REV0, STATE_BEGIN_REV1};
use crate::model::{Country, Location, Region, UNKNOWN_COUNTRY};
use crate::reader::Backing;

/// Upper bound on one city leaf record.
pub const FULL_RECORD_LENGTH: usize = 60;
/// Upper bound on one org/ISP/ASN/domain leaf record.
pub const MAX_ORG_RECORD_LENGTH: usize = 300;

/// First REV1 region index belonging to a US state.
pub const US_OFFSET: u32 = 1;
/// First REV1 region index belonging to a Canadian province.
pub const CANADA_OFFSET: u32 = 677;
/// First REV1 region index partitioned among the remaining countries.
pub const WORLD_OFFSET: u32 = 1353;
/// Width of each per-country block above `WORLD_OFFSET`.
pub const FIPS_RANGE: u32 = 360;

/// Map a terminal pointer from a country-family walk to a country.
///
/// Anything outside the table (including the 0 an overrun walk returns)
/// clamps to the unknown sentinel.
pub(crate) fn decode_country(terminal: u32) -> Country {
    match terminal.checked_sub(COUNTRY_BEGIN) {
        Some(index) => country_at(index as usize),
        None => UNKNOWN_COUNTRY,
    }
}

/// Decode a region edition terminal. Non-region editions yield the empty
/// record.
pub(crate) fn decode_region(info: &DatabaseInfo, terminal: u32) -> Region {
    match info.edition() {
        Edition::RegionRev0 => decode_region_rev0(terminal),
        Edition::RegionRev1 => decode_region_rev1(terminal),
        _ => Region::default(),
    }
}

fn decode_region_rev0(terminal: u32) -> Region {
    let index = terminal.saturating_sub(STATE_BEGIN_REV0);
    if index >= 1000 {
        Region {
            country_code: "US",
            country_name: "United States",
            region: base26_letters(index - 1000),
        }
    } else {
        let country = country_at(index as usize);
        Region {
            country_code: country.code,
            country_name: country.name,
            region: String::new(),
        }
    }
}

fn decode_region_rev1(terminal: u32) -> Region {
    let index = terminal.saturating_sub(STATE_BEGIN_REV1);
    if index < US_OFFSET {
        Region::default()
    } else if index < CANADA_OFFSET {
        Region {
            country_code: "US",
            country_name: "United States",
            region: base26_letters(index - US_OFFSET),
        }
    } else if index < WORLD_OFFSET {
        Region {
            country_code: "CA",
            country_name: "Canada",
            region: base26_letters(index - CANADA_OFFSET),
        }
    } else {
        let country = country_at(((index - WORLD_OFFSET) / FIPS_RANGE) as usize);
        Region {
            country_code: country.code,
            country_name: country.name,
            region: String::new(),
        }
    }
}

/// Two uppercase letters from a base-26 region index.
fn base26_letters(value: u32) -> String {
    let high = (value / 26) % 26;
    let low = value % 26;
    let mut letters = String::with_capacity(2);
    letters.push((b'A' + high as u8) as char);
    letters.push((b'A' + low as u8) as char);
    letters
}

/// Decode a city leaf record. `None` when the walk landed on the null leaf
/// (terminal equal to the segment base).
pub(crate) fn decode_location(
    reader: &Backing,
    info: &DatabaseInfo,
    terminal: u32,
) -> Option<Location> {
    if terminal == info.database_segment() {
        return None;
    }
    let pointer = leaf_pointer(info, terminal);
    let mut buf = [0u8; FULL_RECORD_LENGTH];
    reader.read(&mut buf, pointer);

    let country = country_at(buf[0] as usize);
    let mut record = Location {
        country_code: country.code,
        country_name: country.name,
        ..Location::default()
    };

    let mut at = 1;
    let len = string_scan(&buf, at);
    if len > 0 {
        record.region = latin1(&buf[at..at + len]);
    }
    at += len + 1;

    let len = string_scan(&buf, at);
    if len > 0 {
        record.city = latin1(&buf[at..at + len]);
    }
    at += len + 1;

    let len = string_scan(&buf, at);
    if len > 0 {
        record.postal_code = latin1(&buf[at..at + len]);
    }
    at += len + 1;

    record.latitude = coordinate(&buf, at);
    at += 3;
    record.longitude = coordinate(&buf, at);

    // DMA/area codes exist only in REV1 databases and only for US records.
    if matches!(info.edition(), Edition::CityRev1 | Edition::CityRev1V6)
        && record.country_code == "US"
    {
        at += 3;
        let combo = uint24(&buf, at) as i32;
        record.dma_code = combo / 1000;
        record.metro_code = record.dma_code;
        record.area_code = combo % 1000;
    }

    Some(record)
}

/// Decode an org/ISP/ASN/domain leaf record. `None` only for the null leaf
/// (terminal equal to the segment base); a record holding the empty string
/// decodes as `Some("")`. Because reads are infallible and zero-filling, a
/// swallowed read failure also surfaces as the empty string.
pub(crate) fn decode_org(reader: &Backing, info: &DatabaseInfo, terminal: u32) -> Option<String> {
    if terminal == info.database_segment() {
        return None;
    }
    let pointer = leaf_pointer(info, terminal);
    let mut buf = [0u8; MAX_ORG_RECORD_LENGTH];
    reader.read(&mut buf, pointer);

    let len = string_scan(&buf, 0);
    Some(latin1(&buf[..len]))
}

/// Absolute file offset of the leaf a terminal pointer addresses.
///
/// Terminals live in the pointer space above the segment base; the file
/// interleaves `2 * record_length - 1` segment-widths of node data below
/// the leaf area, hence the rebase.
fn leaf_pointer(info: &DatabaseInfo, terminal: u32) -> u64 {
    terminal as u64 + (2 * info.record_length() as u64 - 1) * info.database_segment() as u64
}

/// Length of the NUL-terminated string starting at `at`, clamped to the
/// buffer.
fn string_scan(buf: &[u8], at: usize) -> usize {
    buf.get(at..)
        .map(|tail| tail.iter().position(|&b| b == 0).unwrap_or(tail.len()))
        .unwrap_or(0)
}

/// ISO-8859-1 bytes to a string; every byte is exactly one code point.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// 24-bit little-endian integer at `at`; bytes past the buffer read as zero.
fn uint24(buf: &[u8], at: usize) -> u32 {
    (0..3).fold(0u32, |acc, i| {
        acc | (buf.get(at + i).copied().unwrap_or(0) as u32) << (i * 8)
    })
}

/// Packed coordinate at `at`: raw / 10000 − 180 degrees.
fn coordinate(buf: &[u8], at: usize) -> f32 {
    (uint24(buf, at) as f64 / 10000.0 - 180.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::COUNTRY_CODES;

    #[test]
    fn country_arithmetic() {
        let us = COUNTRY_CODES.iter().position(|c| *c == "US").unwrap() as u32;
        assert_eq!(decode_country(COUNTRY_BEGIN + us).code, "US");
        assert_eq!(decode_country(COUNTRY_BEGIN), UNKNOWN_COUNTRY);
        // An overrun walk returns 0; it must clamp, not underflow.
        assert_eq!(decode_country(0), UNKNOWN_COUNTRY);
        assert_eq!(decode_country(COUNTRY_BEGIN + 100_000), UNKNOWN_COUNTRY);
    }

    #[test]
    fn region_rev0_ranges() {
        // 1000 + 3 * 26 + 17 = DR
        let region = decode_region_rev0(STATE_BEGIN_REV0 + 1000 + 3 * 26 + 17);
        assert_eq!(region.country_code, "US");
        assert_eq!(region.region, "DR");

        let jp = COUNTRY_CODES.iter().position(|c| *c == "JP").unwrap() as u32;
        let region = decode_region_rev0(STATE_BEGIN_REV0 + jp);
        assert_eq!(region.country_code, "JP");
        assert!(region.region.is_empty());
    }

    #[test]
    fn region_rev1_ranges() {
        let empty = decode_region_rev1(STATE_BEGIN_REV1);
        assert_eq!(empty, Region::default());

        let us = decode_region_rev1(STATE_BEGIN_REV1 + US_OFFSET);
        assert_eq!((us.country_code, us.region.as_str()), ("US", "AA"));

        let ca = decode_region_rev1(STATE_BEGIN_REV1 + CANADA_OFFSET + 26);
        assert_eq!((ca.country_code, ca.region.as_str()), ("CA", "BA"));

        let world = decode_region_rev1(STATE_BEGIN_REV1 + WORLD_OFFSET + FIPS_RANGE * 2);
        assert_eq!(world.country_code, COUNTRY_CODES[2]);
        assert!(world.region.is_empty());
    }

    #[test]
    fn base26_is_bijective_over_both_rev1_blocks() {
        // Every US and Canadian index maps to a distinct letter pair and
        // back.
        let decode = |index: u32, base: u32| {
            let region = decode_region_rev1(STATE_BEGIN_REV1 + index);
            let bytes = region.region.as_bytes();
            base + (bytes[0] - b'A') as u32 * 26 + (bytes[1] - b'A') as u32
        };
        for index in US_OFFSET..CANADA_OFFSET {
            assert_eq!(decode(index, US_OFFSET), index);
        }
        for index in CANADA_OFFSET..WORLD_OFFSET {
            assert_eq!(decode(index, CANADA_OFFSET), index);
        }
    }

    #[test]
    fn coordinate_round_trip() {
        let encode = |degrees: f64| ((degrees + 180.0) * 10000.0).round() as u32;
        for raw in (0u32..1 << 24).step_by(997) {
            let buf = raw.to_le_bytes();
            let decoded = uint24(&buf, 0) as f64 / 10000.0 - 180.0;
            assert_eq!(encode(decoded), raw);
        }
        for raw in [0u32, 1, (1 << 24) - 1] {
            let buf = raw.to_le_bytes();
            let decoded = uint24(&buf, 0) as f64 / 10000.0 - 180.0;
            assert_eq!(encode(decoded), raw);
        }
    }

    #[test]
    fn string_scan_clamps_to_buffer() {
        assert_eq!(string_scan(b"abc\0def", 0), 3);
        assert_eq!(string_scan(b"abc\0def", 4), 3);
        assert_eq!(string_scan(b"abcdef", 2), 4); // no NUL before the end
        assert_eq!(string_scan(b"abc", 10), 0);
    }

    #[test]
    fn latin1_widens_bytes() {
        assert_eq!(latin1(b"Z\xFCrich"), "Z\u{fc}rich");
        assert_eq!(latin1(b"S\xE3o Paulo"), "S\u{e3}o Paulo");
    }
}
