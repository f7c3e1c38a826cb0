use std::collections::HashSet;
use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;

use crate::error::{NoteguardError, NoteguardResult};

/// Largest decompressed archive `pack` will produce and `unpack` will accept
/// (256 MiB)
pub const MAX_ARCHIVE_SIZE: u64 = 256 * 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One named blob inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Uncompressed length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn archive_err(context: &str, e: impl std::fmt::Display) -> NoteguardError {
    NoteguardError::Archive(format!("{}: {}", context, e))
}

fn check_names(entries: &[ArchiveEntry]) -> NoteguardResult<()> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        let name = entry.name.as_str();
        if name.is_empty()
            || name.starts_with('/')
            || name.contains('\\')
            || name.split('/').any(|part| part == ".." || part.is_empty())
        {
            return Err(NoteguardError::Archive(format!(
                "invalid entry name '{}'",
                name
            )));
        }
        if !seen.insert(name) {
            return Err(NoteguardError::Archive(format!(
                "duplicate entry name '{}'",
                name
            )));
        }
    }
    Ok(())
}

/// Counts the uncompressed tar bytes and refuses to grow past `limit`
struct LimitedWriter<W> {
    inner: W,
    written: u64,
    limit: u64,
}

impl<W: Write> Write for LimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("archive exceeds {} bytes when decompressed", self.limit),
            ));
        }
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Pack entries into `writer`, returning the writer once the stream is finished
///
/// Fails with [`NoteguardError::Archive`] if the tar stream would be larger
/// than [`MAX_ARCHIVE_SIZE`], since `unpack` could never read it back.
pub fn pack_into<W: Write>(entries: &[ArchiveEntry], writer: W) -> NoteguardResult<W> {
    pack_limited(entries, writer, MAX_ARCHIVE_SIZE)
}

fn pack_limited<W: Write>(entries: &[ArchiveEntry], writer: W, limit: u64) -> NoteguardResult<W> {
    check_names(entries)?;

    let payload: u64 = entries.iter().map(|e| e.data.len() as u64).sum();
    if payload > limit {
        return Err(NoteguardError::Archive(format!(
            "archive exceeds {} bytes when decompressed",
            limit
        )));
    }

    let encoder = GzBuilder::new()
        .mtime(0)
        .write(writer, Compression::default());
    let mut builder = Builder::new(LimitedWriter {
        inner: encoder,
        written: 0,
        limit,
    });
    builder.mode(tar::HeaderMode::Deterministic);

    for entry in entries {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(entry.data.len() as u64);
        header.set_mode(0o600);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        builder
            .append_data(&mut header, &entry.name, entry.data.as_slice())
            .map_err(|e| archive_err("failed to append entry", e))?;
    }

    let limited = builder
        .into_inner()
        .map_err(|e| archive_err("failed to finish tar stream", e))?;
    let writer = limited
        .inner
        .finish()
        .map_err(|e| archive_err("failed to finish gzip stream", e))?;

    debug!(entries = entries.len(), "packed archive");
    Ok(writer)
}

/// Pack entries into an in-memory archive
pub fn pack(entries: &[ArchiveEntry]) -> NoteguardResult<Vec<u8>> {
    pack_into(entries, Vec::new())
}

/// Unpack an archive into its entries, in stored order
///
/// Fails with [`NoteguardError::Archive`] when the gzip or tar structure is
/// damaged, when an entry's recorded length disagrees with its contents, or
/// when names repeat.
pub fn unpack(bytes: &[u8]) -> NoteguardResult<Vec<ArchiveEntry>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Err(NoteguardError::Archive("missing gzip header".to_string()));
    }

    // Inflate fully first so the gzip trailer (CRC and length) is verified
    // even if the tar stream ends early.
    let mut tar_bytes = Vec::new();
    GzDecoder::new(bytes)
        .take(MAX_ARCHIVE_SIZE + 1)
        .read_to_end(&mut tar_bytes)
        .map_err(|e| archive_err("corrupt compressed stream", e))?;
    if tar_bytes.len() as u64 > MAX_ARCHIVE_SIZE {
        return Err(NoteguardError::Archive(format!(
            "archive exceeds {} bytes when decompressed",
            MAX_ARCHIVE_SIZE
        )));
    }

    let mut archive = Archive::new(tar_bytes.as_slice());
    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for entry in archive
        .entries()
        .map_err(|e| archive_err("unreadable tar stream", e))?
    {
        let mut entry = entry.map_err(|e| archive_err("unreadable tar entry", e))?;

        let entry_type = entry.header().entry_type();
        if entry_type != EntryType::Regular {
            return Err(NoteguardError::Archive(format!(
                "unexpected entry type {:?}",
                entry_type
            )));
        }

        let name = entry
            .path()
            .map_err(|e| archive_err("unreadable entry name", e))?
            .to_string_lossy()
            .into_owned();
        let declared = entry
            .header()
            .size()
            .map_err(|e| archive_err("unreadable entry size", e))?;

        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| archive_err("truncated entry", e))?;

        if data.len() as u64 != declared {
            return Err(NoteguardError::Archive(format!(
                "entry '{}' declares {} bytes but holds {}",
                name,
                declared,
                data.len()
            )));
        }

        if !seen.insert(name.clone()) {
            return Err(NoteguardError::Archive(format!(
                "duplicate entry name '{}'",
                name
            )));
        }

        entries.push(ArchiveEntry { name, data });
    }

    debug!(entries = entries.len(), "unpacked archive");
    Ok(entries)
}
