//! Backing stores for the database file
//!
//! One capability (copy bytes at an absolute file offset into a caller
//! buffer) with three independent implementations selected by [`CacheMode`]
//! at open time. Reads never fail: the destination is zero-filled first and
//! OS errors only log, so a broken read surfaces to callers as an unknown
//! lookup result rather than an error.

use crate::error::{GeoIpError, Result};
use crate::metadata::DatabaseInfo;
use fs2::FileExt;
use std::fs::File;
use std::io::{self, Read};
use std::sync::RwLock;
use tracing::warn;

/// How the engine accesses the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Positional reads against the open file handle. Minimal memory, one
    /// syscall per trie node.
    File,
    /// The trie prefix is loaded eagerly and served from memory; leaf reads
    /// fall through to the file. Fast traversal without buffering leaf data.
    IndexCache,
    /// The whole file is copied into memory at open. Fastest queries,
    /// largest footprint.
    MemoryCache,
}

pub(crate) enum Backing {
    Direct(DirectReader),
    Index(IndexReader),
    Memory(MemoryReader),
}

impl Backing {
    pub(crate) fn open(info: &DatabaseInfo, mode: CacheMode) -> Result<Backing> {
        Ok(match mode {
            CacheMode::File => Backing::Direct(DirectReader::open(info)?),
            CacheMode::IndexCache => Backing::Index(IndexReader::open(info)?),
            CacheMode::MemoryCache => Backing::Memory(MemoryReader::open(info)?),
        })
    }

    /// Best-effort copy of `dest.len()` bytes starting at `offset`.
    ///
    /// Bytes past EOF, read errors, and reads after close all come back as
    /// zeros.
    pub(crate) fn read(&self, dest: &mut [u8], offset: u64) {
        dest.fill(0);
        match self {
            Backing::Direct(reader) => reader.read(dest, offset),
            Backing::Index(reader) => reader.read(dest, offset),
            Backing::Memory(reader) => reader.read(dest, offset),
        }
    }

    /// Release the underlying handle. Idempotent; cached bytes stay usable.
    pub(crate) fn close(&self) {
        match self {
            Backing::Direct(reader) => reader.close(),
            Backing::Index(reader) => reader.file.close(),
            Backing::Memory(_) => {}
        }
    }
}

/// Positional reads against the open file.
pub(crate) struct DirectReader {
    file: RwLock<Option<File>>,
}

impl DirectReader {
    fn open(info: &DatabaseInfo) -> Result<DirectReader> {
        let file = File::open(info.path()).map_err(|e| {
            GeoIpError::Io(format!("failed to open {}: {}", info.path().display(), e))
        })?;
        Ok(DirectReader {
            file: RwLock::new(Some(file)),
        })
    }

    fn read(&self, dest: &mut [u8], offset: u64) {
        let guard = self
            .file
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(file) = guard.as_ref() else {
            // Closed; the zero fill stands.
            return;
        };
        if let Err(e) = read_full_at(file, dest, offset) {
            warn!(offset, error = %e, "database read failed");
        }
    }

    fn close(&self) {
        let mut guard = self
            .file
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }
}

/// The entire file copied into memory at open.
pub(crate) struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    fn open(info: &DatabaseInfo) -> Result<MemoryReader> {
        let mut file = File::open(info.path()).map_err(|e| {
            GeoIpError::Io(format!("failed to open {}: {}", info.path().display(), e))
        })?;
        // Hold the advisory lock for the whole copy so a concurrent writer
        // cannot truncate mid-read.
        file.lock_exclusive()
            .map_err(|e| GeoIpError::Io(format!("failed to lock {}: {}", info.path().display(), e)))?;
        let mut data = Vec::new();
        let result = file.read_to_end(&mut data);
        let _ = FileExt::unlock(&file);
        result?;
        Ok(MemoryReader { data })
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(data: Vec<u8>) -> MemoryReader {
        MemoryReader { data }
    }

    fn read(&self, dest: &mut [u8], offset: u64) {
        let Ok(offset) = usize::try_from(offset) else {
            return;
        };
        if offset >= self.data.len() {
            return;
        }
        let n = dest.len().min(self.data.len() - offset);
        dest[..n].copy_from_slice(&self.data[offset..offset + n]);
    }
}

/// A direct reader composed with an in-memory copy of the trie prefix.
///
/// The prefix covers `database_segment * record_length * 2` bytes, clamped
/// to the file length; every node visited during traversal lands inside it.
/// Reads not wholly within the prefix fall through to the file.
pub(crate) struct IndexReader {
    prefix: Vec<u8>,
    file: DirectReader,
}

impl IndexReader {
    fn open(info: &DatabaseInfo) -> Result<IndexReader> {
        let file = DirectReader::open(info)?;
        let want = info.database_segment() as u64 * info.record_length() as u64 * 2;
        let len = {
            let guard = file
                .file
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard
                .as_ref()
                .map(|f| f.metadata().map(|m| m.len()))
                .transpose()?
                .unwrap_or(0)
        };
        let mut prefix = vec![0u8; want.min(len) as usize];
        file.read(&mut prefix, 0);
        Ok(IndexReader { prefix, file })
    }

    fn read(&self, dest: &mut [u8], offset: u64) {
        let end = offset.saturating_add(dest.len() as u64);
        if end <= self.prefix.len() as u64 {
            let offset = offset as usize;
            dest.copy_from_slice(&self.prefix[offset..offset + dest.len()]);
        } else {
            self.file.read(dest, offset);
        }
    }
}

#[cfg(unix)]
fn read_full_at(file: &File, mut dest: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    while !dest.is_empty() {
        match file.read_at(dest, offset) {
            // EOF; the rest stays zeroed.
            Ok(0) => break,
            Ok(n) => {
                dest = &mut dest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn read_full_at(file: &File, mut dest: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !dest.is_empty() {
        match file.seek_read(dest, offset) {
            Ok(0) => break,
            Ok(n) => {
                dest = &mut dest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn info_for(file: &NamedTempFile, trailer: &[u8], body: &[u8]) -> DatabaseInfo {
        let mut f = file.reopen().unwrap();
        f.write_all(body).unwrap();
        f.write_all(trailer).unwrap();
        f.flush().unwrap();
        DatabaseInfo::open(file.path()).unwrap()
    }

    #[test]
    fn direct_reads_and_zero_fills_past_eof() {
        let file = NamedTempFile::new().unwrap();
        let body: Vec<u8> = (0u8..64).collect();
        let info = info_for(&file, &[0xFF, 0xFF, 0xFF, 1], &body);

        let backing = Backing::open(&info, CacheMode::File).unwrap();
        let mut buf = [0u8; 4];
        backing.read(&mut buf, 4);
        assert_eq!(buf, [4, 5, 6, 7]);

        // Straddles EOF: leading bytes real, the rest zero.
        let mut tail = [0xAAu8; 8];
        backing.read(&mut tail, 64);
        assert_eq!(&tail[..4], &[0xFF, 0xFF, 0xFF, 1]);
        assert_eq!(&tail[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn close_is_idempotent_and_reads_become_zeros() {
        let file = NamedTempFile::new().unwrap();
        let info = info_for(&file, &[0xFF, 0xFF, 0xFF, 1], &[7u8; 64]);

        let backing = Backing::open(&info, CacheMode::File).unwrap();
        backing.close();
        backing.close();

        let mut buf = [0xAAu8; 4];
        backing.read(&mut buf, 0);
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn memory_cache_serves_after_close() {
        let file = NamedTempFile::new().unwrap();
        let info = info_for(&file, &[0xFF, 0xFF, 0xFF, 1], &[9u8; 64]);

        let backing = Backing::open(&info, CacheMode::MemoryCache).unwrap();
        backing.close();
        let mut buf = [0u8; 2];
        backing.read(&mut buf, 0);
        assert_eq!(buf, [9, 9]);
    }

    #[test]
    fn index_prefix_serves_trie_reads_after_close() {
        let file = NamedTempFile::new().unwrap();
        // CityRev1 with a 4-node segment: prefix covers 4 * 3 * 2 = 24 bytes.
        let body: Vec<u8> = (0u8..64).collect();
        let info = info_for(&file, &[0xFF, 0xFF, 0xFF, 2, 4, 0, 0], &body);
        assert_eq!(info.database_segment(), 4);

        let backing = Backing::open(&info, CacheMode::IndexCache).unwrap();
        backing.close();

        // Inside the 24-byte prefix window: served from memory.
        let mut buf = [0u8; 6];
        backing.read(&mut buf, 6);
        assert_eq!(buf, [6, 7, 8, 9, 10, 11]);

        // Beyond the window the closed file yields zeros.
        let mut leaf = [0xAAu8; 4];
        backing.read(&mut leaf, 30);
        assert_eq!(leaf, [0, 0, 0, 0]);
    }

    #[test]
    fn memory_reader_clamps_offsets() {
        let backing = Backing::Memory(MemoryReader::from_bytes(vec![1, 2, 3]));

        let mut buf = [0xAAu8; 4];
        backing.read(&mut buf, 1);
        assert_eq!(buf, [2, 3, 0, 0]);

        backing.read(&mut buf, 100);
        assert_eq!(buf, [0, 0, 0, 0]);
    }
}
