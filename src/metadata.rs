//! Database metadata recovery
//!
//! Legacy GeoIP files carry their structure information in a trailing header:
//! the last bytes of the file, preceded by a run of three `0xFF` sentinel
//! bytes. The header names the edition, and for editions with a variable
//! leaf segment it carries the segment offset as a 3-byte little-endian
//! integer. Everything the query path needs is extracted once at open time
//! into an immutable [`DatabaseInfo`]; the file is not touched again for
//! metadata.
//!
//! Layout of the tail of a file:
//!
//! ```text
//! ... trie nodes ... | leaf records ... | 0xFF 0xFF 0xFF | header (1..=20 bytes)
//!                                                          ^ edition byte,
//!                                                            optional segment,
//!                                                            optional info text
//! ```

use crate::error::{GeoIpError, Result};
use chrono::NaiveDate;
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// First country index in the pointer space; terminals at or above this
/// value in country-family editions index the country table.
pub const COUNTRY_BEGIN: u32 = 16_776_960;
/// Leaf segment of REGION_REV0 databases.
pub const STATE_BEGIN_REV0: u32 = 16_700_000;
/// Leaf segment of REGION_REV1 databases.
pub const STATE_BEGIN_REV1: u32 = 16_000_000;

/// Maximum length of the trailing structure header.
pub const STRUCTURE_INFO_MAX_SIZE: usize = 20;
/// Maximum length of the legacy database-info text block.
pub const DATABASE_INFO_MAX_SIZE: usize = 100;

const SEGMENT_RECORD_LENGTH: usize = 3;
const STANDARD_RECORD_LENGTH: usize = 3;
const ORG_RECORD_LENGTH: usize = 4;

/// Database edition, the schema tag stored in the trailing header
///
/// The discriminants are the on-disk edition ids and are stable; fixtures
/// and downstream consumers depend on the exact values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Edition {
    /// Country lookups, IPv4
    Country = 1,
    /// City lookups with DMA/area codes, IPv4
    CityRev1 = 2,
    /// Region lookups, revision 1
    RegionRev1 = 3,
    /// ISP name lookups
    Isp = 4,
    /// Organization name lookups
    Org = 5,
    /// City lookups without DMA/area codes, IPv4
    CityRev0 = 6,
    /// Region lookups, revision 0
    RegionRev0 = 7,
    /// Anonymous-proxy flags
    Proxy = 8,
    /// Autonomous-system lookups, IPv4
    AsNum = 9,
    /// Connection-speed lookups, revision 0
    NetSpeed = 10,
    /// Domain-name lookups
    Domain = 11,
    /// Country lookups, IPv6
    CountryV6 = 12,
    /// Autonomous-system lookups, IPv6
    AsNumV6 = 21,
    /// ISP name lookups, IPv6
    IspV6 = 22,
    /// Organization name lookups, IPv6
    OrgV6 = 23,
    /// Domain-name lookups, IPv6
    DomainV6 = 24,
    /// City lookups, revision 1, IPv6
    CityRev1V6 = 30,
    /// City lookups, revision 0, IPv6
    CityRev0V6 = 31,
    /// Connection-speed lookups, revision 1, IPv4
    NetSpeedRev1 = 32,
    /// Connection-speed lookups, revision 1, IPv6
    NetSpeedRev1V6 = 33,
}

/// Where an edition's leaf segment comes from.
enum SegmentSource {
    /// A constant baked into the format.
    Fixed(u32),
    /// A 3-byte little-endian field following the edition byte.
    Trailing,
}

impl Edition {
    /// Decode the raw edition byte from the header.
    ///
    /// Values of 106 and above are rebased by 105; some historical builds
    /// wrote the edition offset that way.
    pub fn from_byte(raw: u8) -> Result<Edition> {
        let id = if raw >= 106 { raw - 105 } else { raw };
        Ok(match id {
            1 => Edition::Country,
            2 => Edition::CityRev1,
            3 => Edition::RegionRev1,
            4 => Edition::Isp,
            5 => Edition::Org,
            6 => Edition::CityRev0,
            7 => Edition::RegionRev0,
            8 => Edition::Proxy,
            9 => Edition::AsNum,
            10 => Edition::NetSpeed,
            11 => Edition::Domain,
            12 => Edition::CountryV6,
            21 => Edition::AsNumV6,
            22 => Edition::IspV6,
            23 => Edition::OrgV6,
            24 => Edition::DomainV6,
            30 => Edition::CityRev1V6,
            31 => Edition::CityRev0V6,
            32 => Edition::NetSpeedRev1,
            33 => Edition::NetSpeedRev1V6,
            _ => return Err(GeoIpError::UnknownEdition(raw)),
        })
    }

    /// Width in bytes of one child pointer inside a trie node.
    pub fn record_length(self) -> usize {
        match self {
            Edition::Isp
            | Edition::IspV6
            | Edition::Org
            | Edition::OrgV6
            | Edition::Domain
            | Edition::DomainV6 => ORG_RECORD_LENGTH,
            Edition::Country
            | Edition::CityRev1
            | Edition::RegionRev1
            | Edition::CityRev0
            | Edition::RegionRev0
            | Edition::Proxy
            | Edition::AsNum
            | Edition::NetSpeed
            | Edition::CountryV6
            | Edition::AsNumV6
            | Edition::CityRev1V6
            | Edition::CityRev0V6
            | Edition::NetSpeedRev1
            | Edition::NetSpeedRev1V6 => STANDARD_RECORD_LENGTH,
        }
    }

    /// True for editions keyed by 128-bit addresses.
    pub fn is_ipv6(self) -> bool {
        match self {
            Edition::CountryV6
            | Edition::AsNumV6
            | Edition::IspV6
            | Edition::OrgV6
            | Edition::DomainV6
            | Edition::CityRev1V6
            | Edition::CityRev0V6
            | Edition::NetSpeedRev1V6 => true,
            Edition::Country
            | Edition::CityRev1
            | Edition::RegionRev1
            | Edition::Isp
            | Edition::Org
            | Edition::CityRev0
            | Edition::RegionRev0
            | Edition::Proxy
            | Edition::AsNum
            | Edition::NetSpeed
            | Edition::NetSpeedRev1
            | Edition::Domain => false,
        }
    }

    fn segment_source(self) -> SegmentSource {
        match self {
            Edition::Country | Edition::CountryV6 | Edition::Proxy | Edition::NetSpeed => {
                SegmentSource::Fixed(COUNTRY_BEGIN)
            }
            Edition::RegionRev0 => SegmentSource::Fixed(STATE_BEGIN_REV0),
            Edition::RegionRev1 => SegmentSource::Fixed(STATE_BEGIN_REV1),
            Edition::CityRev0
            | Edition::CityRev1
            | Edition::CityRev0V6
            | Edition::CityRev1V6
            | Edition::AsNum
            | Edition::AsNumV6
            | Edition::NetSpeedRev1
            | Edition::NetSpeedRev1V6
            | Edition::Isp
            | Edition::IspV6
            | Edition::Org
            | Edition::OrgV6
            | Edition::Domain
            | Edition::DomainV6 => SegmentSource::Trailing,
        }
    }
}

impl From<Edition> for u8 {
    fn from(edition: Edition) -> u8 {
        edition as u8
    }
}

/// Immutable metadata derived once when a database is opened
#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    path: PathBuf,
    edition: Edition,
    record_length: usize,
    database_segment: u32,
    premium: bool,
    date: Option<NaiveDate>,
}

impl DatabaseInfo {
    /// Read the trailing header of the file at `path` and derive the
    /// edition, record width and leaf-segment offset.
    ///
    /// The read happens under an advisory exclusive lock so a concurrent
    /// updater cannot truncate the tail mid-read. Fails on unreadable or
    /// undersized files and on unknown edition bytes.
    pub fn open(path: &Path) -> Result<DatabaseInfo> {
        let header = read_trailing_header(path)?;

        let edition = match header.first() {
            Some(&byte) => Edition::from_byte(byte)?,
            // No sentinel found: the oldest country builds carried no header.
            None => Edition::Country,
        };

        let record_length = edition.record_length();
        let (database_segment, body) = match edition.segment_source() {
            SegmentSource::Fixed(segment) => (segment, header.get(1..).unwrap_or(&[])),
            SegmentSource::Trailing => {
                let field = header.get(1..1 + SEGMENT_RECORD_LENGTH).ok_or_else(|| {
                    GeoIpError::Format("trailing header truncated before segment field".into())
                })?;
                let segment =
                    field[0] as u32 | (field[1] as u32) << 8 | (field[2] as u32) << 16;
                (segment, header.get(1 + SEGMENT_RECORD_LENGTH..).unwrap_or(&[]))
            }
        };

        Ok(DatabaseInfo {
            path: path.to_path_buf(),
            edition,
            record_length,
            database_segment,
            premium: !contains(body, b"FREE"),
            date: parse_build_date(body),
        })
    }

    /// Filesystem location of the database, used for reopen on watch events.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The database edition.
    pub fn edition(&self) -> Edition {
        self.edition
    }

    /// Bytes per child pointer inside a trie node, 3 or 4.
    pub fn record_length(&self) -> usize {
        self.record_length
    }

    /// Absolute byte offset at which leaf records begin.
    pub fn database_segment(&self) -> u32 {
        self.database_segment
    }

    /// True unless the header marks the database as a free build.
    pub fn is_premium(&self) -> bool {
        self.premium
    }

    /// Build date parsed from the header text, when present.
    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }
}

/// Read the last `STRUCTURE_INFO_MAX_SIZE + 3` bytes and return the header:
/// the bytes following the nearest-to-EOF run of three `0xFF`s, empty when
/// no run exists in the window.
fn read_trailing_header(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)
        .map_err(|e| GeoIpError::Io(format!("failed to open {}: {}", path.display(), e)))?;
    file.lock_exclusive()
        .map_err(|e| GeoIpError::Io(format!("failed to lock {}: {}", path.display(), e)))?;

    let result = read_tail(&mut file);
    let _ = FileExt::unlock(&file);
    let tail = result?;

    for i in 0..STRUCTURE_INFO_MAX_SIZE {
        let at = STRUCTURE_INFO_MAX_SIZE - i;
        if tail[at..at + 3] == [0xFF, 0xFF, 0xFF] {
            return Ok(tail[tail.len() - i..].to_vec());
        }
    }
    Ok(Vec::new())
}

fn read_tail(file: &mut File) -> Result<Vec<u8>> {
    let window = STRUCTURE_INFO_MAX_SIZE + 3;
    let len = file.metadata()?.len();
    if len < window as u64 {
        return Err(GeoIpError::Format(format!(
            "file too small for a structure header: {} bytes (need at least {})",
            len, window
        )));
    }
    file.seek(SeekFrom::End(-(window as i64)))?;
    let mut tail = vec![0u8; window];
    file.read_exact(&mut tail)?;
    Ok(tail)
}

/// Scan the header body for the first whitespace byte and parse the eight
/// bytes after it as a `yyyyMMdd` build date.
fn parse_build_date(body: &[u8]) -> Option<NaiveDate> {
    let at = body.iter().position(|b| b.is_ascii_whitespace())?;
    let digits = body.get(at + 1..at + 9)?;
    let text = std::str::from_utf8(digits).ok()?;
    NaiveDate::parse_from_str(text, "%Y%m%d").ok()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
