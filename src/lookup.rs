//! The lookup facade
//!
//! [`LookupService`] binds a backing store, the parsed metadata, the trie
//! walker and the record decoders behind the public query surface. One
//! instance is immutable after `open` and may serve concurrent lookups;
//! the hot-reload watcher produces a *replacement* instance instead of
//! mutating a live one.

use crate::error::Result;
use crate::metadata::DatabaseInfo;
use crate::model::{Country, Location, Region, UNKNOWN_COUNTRY};
use crate::reader::{Backing, CacheMode};
use crate::record;
use crate::tree::SearchTree;
use crate::watch::{self, WatcherHandle};
use std::net::{IpAddr, Ipv6Addr, ToSocketAddrs};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Callback receiving a freshly opened engine after the database file
/// changed on disk.
pub type UpdateCallback = Box<dyn Fn(LookupService) + Send + 'static>;

/// A read-only lookup engine over one legacy GeoIP database file
///
/// Create one service per database and reuse it; queries are cheap and
/// reentrant. The edition of the file decides which queries return data:
/// country editions answer [`country`](Self::country), city editions answer
/// [`location`](Self::location), org/ISP/ASN/domain editions answer
/// [`org`](Self::org), region editions answer [`region`](Self::region).
///
/// ```no_run
/// use geodat::{CacheMode, LookupService};
///
/// let service = LookupService::open("GeoIP.dat", CacheMode::MemoryCache)?;
/// let country = service.country_by_name("64.17.254.216");
/// println!("{} ({})", country.name, country.code);
/// # Ok::<(), geodat::GeoIpError>(())
/// ```
pub struct LookupService {
    info: DatabaseInfo,
    reader: Backing,
    mode: CacheMode,
    watcher: Mutex<Option<WatcherHandle>>,
}

impl LookupService {
    /// Open the database at `path` with the given backing-store mode.
    ///
    /// Fails on unreadable or structurally invalid files and on unknown
    /// edition bytes; queries themselves never fail.
    pub fn open<P: AsRef<Path>>(path: P, mode: CacheMode) -> Result<LookupService> {
        let info = DatabaseInfo::open(path.as_ref())?;
        let reader = Backing::open(&info, mode)?;
        Ok(LookupService {
            info,
            reader,
            mode,
            watcher: Mutex::new(None),
        })
    }

    /// Metadata derived at open time.
    pub fn database_info(&self) -> &DatabaseInfo {
        &self.info
    }

    /// Release the underlying file handle. Idempotent; later queries return
    /// the unknown sentinel instead of failing.
    pub fn close(&self) {
        self.reader.close();
    }

    /// Country for an IPv4 address (accepts `Ipv4Addr` or a raw `u32` key).
    pub fn country(&self, address: impl Into<u32>) -> Country {
        record::decode_country(self.seek_v4(address.into()))
    }

    /// Country for an IPv6 address.
    pub fn country_v6(&self, address: Ipv6Addr) -> Country {
        record::decode_country(self.seek_v6(&address.octets()))
    }

    /// Country for a host name or address string. Returns the `("--","N/A")`
    /// sentinel when the host cannot be resolved.
    pub fn country_by_name(&self, host: &str) -> Country {
        match self.resolve_for_edition(host) {
            Some(ResolvedKey::V4(key)) => self.country(key),
            Some(ResolvedKey::V6(octets)) => record::decode_country(self.seek_v6(&octets)),
            None => UNKNOWN_COUNTRY,
        }
    }

    /// Country for an IPv6 address string (`::a.b.c.d` and `::ffff:a.b.c.d`
    /// forms included). Sentinel when unresolvable.
    pub fn country_v6_by_name(&self, host: &str) -> Country {
        match resolve(host) {
            Some(address) => record::decode_country(self.seek_v6(&v6_key(address))),
            None => UNKNOWN_COUNTRY,
        }
    }

    /// Raw record id for an IPv4 address: terminal pointer minus the leaf
    /// segment base.
    pub fn id(&self, address: impl Into<u32>) -> i32 {
        (self.seek_v4(address.into()) as i64 - self.info.database_segment() as i64) as i32
    }

    /// Raw record id for a host name or address string; 0 when the host
    /// cannot be resolved.
    pub fn id_by_name(&self, host: &str) -> i32 {
        let Some(key) = self.resolve_for_edition(host) else {
            return 0;
        };
        let terminal = match key {
            ResolvedKey::V4(key) => self.seek_v4(key),
            ResolvedKey::V6(octets) => self.seek_v6(&octets),
        };
        (terminal as i64 - self.info.database_segment() as i64) as i32
    }

    /// Region record for an IPv4 address. Empty record on non-region
    /// editions.
    pub fn region(&self, address: impl Into<u32>) -> Region {
        record::decode_region(&self.info, self.seek_v4(address.into()))
    }

    /// Region record for a host name or address string; `None` when the
    /// host cannot be resolved.
    pub fn region_by_name(&self, host: &str) -> Option<Region> {
        match self.resolve_for_edition(host)? {
            ResolvedKey::V4(key) => Some(self.region(key)),
            ResolvedKey::V6(octets) => {
                Some(record::decode_region(&self.info, self.seek_v6(&octets)))
            }
        }
    }

    /// City-level record for an IPv4 address (City editions). `None` when
    /// the address has no record.
    pub fn location(&self, address: impl Into<u32>) -> Option<Location> {
        record::decode_location(&self.reader, &self.info, self.seek_v4(address.into()))
    }

    /// City-level record for an IPv6 address.
    pub fn location_v6(&self, address: Ipv6Addr) -> Option<Location> {
        record::decode_location(&self.reader, &self.info, self.seek_v6(&address.octets()))
    }

    /// City-level record for a host name or address string.
    pub fn location_by_name(&self, host: &str) -> Option<Location> {
        match self.resolve_for_edition(host)? {
            ResolvedKey::V4(key) => self.location(key),
            ResolvedKey::V6(octets) => {
                record::decode_location(&self.reader, &self.info, self.seek_v6(&octets))
            }
        }
    }

    /// City-level record for an IPv6 address string.
    pub fn location_v6_by_name(&self, host: &str) -> Option<Location> {
        let address = resolve(host)?;
        record::decode_location(&self.reader, &self.info, self.seek_v6(&v6_key(address)))
    }

    /// Organization / ISP / ASN / domain string for an IPv4 address.
    pub fn org(&self, address: impl Into<u32>) -> Option<String> {
        record::decode_org(&self.reader, &self.info, self.seek_v4(address.into()))
    }

    /// Organization / ISP / ASN / domain string for an IPv6 address.
    pub fn org_v6(&self, address: Ipv6Addr) -> Option<String> {
        record::decode_org(&self.reader, &self.info, self.seek_v6(&address.octets()))
    }

    /// Organization string for a host name or address string.
    pub fn org_by_name(&self, host: &str) -> Option<String> {
        match self.resolve_for_edition(host)? {
            ResolvedKey::V4(key) => self.org(key),
            ResolvedKey::V6(octets) => {
                record::decode_org(&self.reader, &self.info, self.seek_v6(&octets))
            }
        }
    }

    /// Organization string for an IPv6 address string.
    pub fn org_v6_by_name(&self, host: &str) -> Option<String> {
        let address = resolve(host)?;
        record::decode_org(&self.reader, &self.info, self.seek_v6(&v6_key(address)))
    }

    /// Install, replace or cancel the hot-reload watcher.
    ///
    /// At most one watcher is active per engine; a new callback cancels the
    /// previous task before starting, and `None` cancels without
    /// replacement. On every modify event touching the database file the
    /// watcher opens a fresh engine over the same path and mode and hands
    /// it to the callback; the running engine is never mutated.
    pub fn watch(&self, callback: Option<UpdateCallback>) -> Result<()> {
        let mut slot = self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        if let Some(callback) = callback {
            *slot = Some(watch::spawn(
                self.info.path().to_path_buf(),
                self.mode,
                callback,
            )?);
        }
        Ok(())
    }

    fn seek_v4(&self, key: u32) -> u32 {
        SearchTree::new(&self.reader, &self.info).seek_v4(key)
    }

    fn seek_v6(&self, key: &[u8; 16]) -> u32 {
        SearchTree::new(&self.reader, &self.info).seek_v6(key)
    }

    /// Resolve a host string and pick the trie family the edition expects.
    ///
    /// A v4 address on a v6 edition is zero-extended into the low four key
    /// bytes (`::a.b.c.d`); a v6 address on a v4 edition is unanswerable
    /// and treated as unresolved.
    fn resolve_for_edition(&self, host: &str) -> Option<ResolvedKey> {
        let address = resolve(host)?;
        if self.info.edition().is_ipv6() {
            return Some(ResolvedKey::V6(v6_key(address)));
        }
        match address {
            IpAddr::V4(v4) => Some(ResolvedKey::V4(v4.into())),
            IpAddr::V6(_) => {
                debug!(host, "IPv6 address queried against an IPv4 edition");
                None
            }
        }
    }
}

impl Drop for LookupService {
    fn drop(&mut self) {
        let mut slot = self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = slot.take() {
            handle.cancel();
        }
    }
}

enum ResolvedKey {
    V4(u32),
    V6([u8; 16]),
}

/// Host resolution: literal addresses parse directly, anything else goes
/// through the system resolver. Failures are swallowed by every caller.
fn resolve(host: &str) -> Option<IpAddr> {
    if let Ok(address) = host.parse::<IpAddr>() {
        return Some(address);
    }
    match (host, 0u16).to_socket_addrs() {
        Ok(mut addresses) => addresses.next().map(|sock| sock.ip()),
        Err(e) => {
            debug!(host, error = %e, "host resolution failed");
            None
        }
    }
}

/// 16-byte trie key for an address, zero-extending v4 into the last four
/// bytes.
fn v6_key(address: IpAddr) -> [u8; 16] {
    match address {
        IpAddr::V6(v6) => v6.octets(),
        IpAddr::V4(v4) => {
            let mut key = [0u8; 16];
            key[12..].copy_from_slice(&v4.octets());
            key
        }
    }
}
