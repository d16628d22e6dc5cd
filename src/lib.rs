//! geodat - Lookup engine for legacy GeoIP binary databases
//!
//! geodat reads the packed binary `.dat` files of the legacy MaxMind GeoIP
//! format and answers country, region, city, organization and ASN queries
//! for IPv4 and IPv6 addresses. It is a read-only engine: no database
//! writing, no network lookups, no result caching.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use geodat::{CacheMode, LookupService};
//!
//! let service = LookupService::open("GeoIP.dat", CacheMode::IndexCache)?;
//!
//! let country = service.country_by_name("64.17.254.216");
//! println!("country: {} ({})", country.name, country.code);
//!
//! // City editions answer location queries instead.
//! if let Some(location) = service.location_by_name("64.17.254.216") {
//!     println!("{} @ {},{}", location.city, location.latitude, location.longitude);
//! }
//! # Ok::<(), geodat::GeoIpError>(())
//! ```
//!
//! # Key properties
//!
//! - **Edition aware**: all twenty legacy editions (country, region rev0/1,
//!   city rev0/1, org, ISP, ASN, domain, netspeed, proxy, and their IPv6
//!   variants) are recognized from the trailing structure header.
//! - **Three backing stores**: direct positional reads, a cached trie
//!   prefix, or a full in-memory copy ([`CacheMode`]).
//! - **Best-effort queries**: lookups never return errors. Unresolvable
//!   hosts, read failures and malformed tries all come back as the unknown
//!   sentinel or `None`.
//! - **Hot reload**: a cancellable watcher task republishes a freshly
//!   opened engine whenever the file changes on disk
//!   ([`LookupService::watch`]).
//!
//! # File format
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  byte 0: packed radix-2 trie              │
//! │    node = two little-endian pointers      │
//! │    (3 or 4 bytes each, per edition)       │
//! ├───────────────────────────────────────────┤
//! │  leaf records (city/org editions)         │
//! │    NUL-terminated ISO-8859-1 strings,     │
//! │    24-bit packed coordinates              │
//! ├───────────────────────────────────────────┤
//! │  0xFF 0xFF 0xFF | structure header        │
//! │    edition byte, segment offset, info     │
//! └───────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// The process-wide country tables
pub mod country;
/// Error types for database operations
pub mod error;
/// The lookup facade
pub mod lookup;
/// Edition tags and trailing-header metadata
pub mod metadata;
/// Value records returned by lookups
pub mod model;
/// Backing-store modes
pub mod reader;
mod record;
mod tree;
mod watch;

pub use crate::country::{COUNTRY_CODES, COUNTRY_NAMES};
pub use crate::error::{GeoIpError, Result};
pub use crate::lookup::{LookupService, UpdateCallback};
pub use crate::metadata::{DatabaseInfo, Edition};
pub use crate::model::{Country, Location, Region, UNKNOWN_COUNTRY};
pub use crate::reader::CacheMode;

pub use crate::metadata::{
    COUNTRY_BEGIN, DATABASE_INFO_MAX_SIZE, STATE_BEGIN_REV0, STATE_BEGIN_REV1,
    STRUCTURE_INFO_MAX_SIZE,
};
pub use crate::record::{
    CANADA_OFFSET, FIPS_RANGE, FULL_RECORD_LENGTH, MAX_ORG_RECORD_LENGTH, US_OFFSET, WORLD_OFFSET,
};
