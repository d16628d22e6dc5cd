//! Shared fixture builder for integration tests
//!
//! Builds small legacy-format databases in memory: a prefix trie serialized
//! as packed two-pointer nodes, an optional leaf section, and the trailing
//! 0xFF sentinel + structure header. The library itself never writes
//! databases, so this stays test-only.

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

#[derive(Clone, Copy)]
enum Child {
    /// Unclaimed address space; serializes as the segment base (the null
    /// terminal).
    Unknown,
    /// Internal node index.
    Node(u32),
    /// Terminal at `segment + delta`.
    Terminal(u32),
}

pub struct FixtureBuilder {
    record_length: usize,
    nodes: Vec<[Child; 2]>,
    leaves: Vec<u8>,
}

impl FixtureBuilder {
    pub fn new(record_length: usize) -> FixtureBuilder {
        FixtureBuilder {
            record_length,
            nodes: vec![[Child::Unknown; 2]],
            // One pad byte so real leaf deltas start at 1; delta 0 is the
            // null record.
            leaves: vec![0],
        }
    }

    /// Route `address/prefix_len` to the terminal `segment + delta`.
    pub fn insert_v4(&mut self, address: u32, prefix_len: usize, delta: u32) {
        self.insert(|i| ((address >> (31 - i)) & 1) as usize, prefix_len, delta);
    }

    /// Route a v6 prefix (MSB-first within each byte) to `segment + delta`.
    pub fn insert_v6(&mut self, address: [u8; 16], prefix_len: usize, delta: u32) {
        self.insert(
            |i| ((address[i / 8] >> (7 - (i % 8))) & 1) as usize,
            prefix_len,
            delta,
        );
    }

    /// Append a leaf record, returning its terminal delta.
    pub fn add_leaf(&mut self, bytes: &[u8]) -> u32 {
        let delta = self.leaves.len() as u32;
        self.leaves.extend_from_slice(bytes);
        delta
    }

    /// Serialize with a fixed segment base (country/region/proxy/netspeed
    /// editions): the header is just the edition byte.
    pub fn build_fixed(&self, edition: u8, segment: u32) -> Vec<u8> {
        self.serialize(segment, &[0xFF, 0xFF, 0xFF, edition])
    }

    /// Serialize with the segment carried in the header (city/org families):
    /// the segment equals the node count so leaves start right after the
    /// trie.
    pub fn build_trailing(&self, edition: u8) -> Vec<u8> {
        let segment = self.nodes.len() as u32;
        let mut trailer = vec![0xFF, 0xFF, 0xFF, edition];
        trailer.extend_from_slice(&segment.to_le_bytes()[..3]);
        self.serialize(segment, &trailer)
    }

    fn insert(&mut self, side_at: impl Fn(usize) -> usize, prefix_len: usize, delta: u32) {
        let mut node = 0usize;
        for i in 0..prefix_len {
            let side = side_at(i);
            if i + 1 == prefix_len {
                self.nodes[node][side] = Child::Terminal(delta);
                return;
            }
            node = match self.nodes[node][side] {
                Child::Node(n) => n as usize,
                _ => {
                    let n = self.nodes.len();
                    self.nodes.push([Child::Unknown; 2]);
                    self.nodes[node][side] = Child::Node(n as u32);
                    n
                }
            };
        }
    }

    fn serialize(&self, segment: u32, trailer: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for node in &self.nodes {
            for child in node {
                let value = match child {
                    Child::Unknown => segment,
                    Child::Node(n) => *n,
                    Child::Terminal(delta) => segment + delta,
                };
                out.extend_from_slice(&value.to_le_bytes()[..self.record_length]);
            }
        }
        out.extend_from_slice(&self.leaves);
        out.extend_from_slice(trailer);
        out
    }
}

/// Write fixture bytes to a temp file that lives as long as the handle.
pub fn write_db(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// Index of a code in the country table, for building terminals.
pub fn country_index(code: &str) -> u32 {
    geodat::COUNTRY_CODES
        .iter()
        .position(|c| *c == code)
        .unwrap() as u32
}

/// Raw 24-bit coordinate for a value in degrees.
pub fn coordinate_raw(degrees: f64) -> [u8; 3] {
    let raw = ((degrees + 180.0) * 10000.0).round() as u32;
    let bytes = raw.to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

/// A city leaf: country index, region/city/postal strings, coordinates and
/// an optional metro/area combo.
pub fn city_leaf(
    country: u32,
    region: &str,
    city: &[u8],
    postal: &str,
    latitude: f64,
    longitude: f64,
    metro_combo: Option<u32>,
) -> Vec<u8> {
    let mut leaf = vec![country as u8];
    leaf.extend_from_slice(region.as_bytes());
    leaf.push(0);
    leaf.extend_from_slice(city);
    leaf.push(0);
    leaf.extend_from_slice(postal.as_bytes());
    leaf.push(0);
    leaf.extend_from_slice(&coordinate_raw(latitude));
    leaf.extend_from_slice(&coordinate_raw(longitude));
    if let Some(combo) = metro_combo {
        leaf.extend_from_slice(&combo.to_le_bytes()[..3]);
    }
    leaf
}

/// 16-byte key with the v4 octets in the last four positions (`::a.b.c.d`).
pub fn v4_in_v6(address: [u8; 4]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[12..].copy_from_slice(&address);
    key
}

/// 16-byte key in the `::ffff:a.b.c.d` mapped form.
pub fn v4_mapped(address: [u8; 4]) -> [u8; 16] {
    let mut key = v4_in_v6(address);
    key[10] = 0xFF;
    key[11] = 0xFF;
    key
}
