//! Archive codec for backup payloads
//!
//! Packs named byte blobs into a gzip-compressed tar container and unpacks
//! them again. Output is deterministic: entries keep their insertion order and
//! every header field that could vary between runs (mtime, owner, mode) is
//! fixed, so the same blobs always produce the same bytes.
//!
//! Each tar header records the entry's uncompressed length, which `unpack`
//! checks against the bytes actually read.

mod codec;

pub use codec::{pack, pack_into, unpack, ArchiveEntry, MAX_ARCHIVE_SIZE};
