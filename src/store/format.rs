//! On-disk header and trailer records.
//!
//! All integers are little-endian, all fields naturally aligned. The
//! header occupies the first 256 bytes of the file and is written once
//! at creation; only its `latest_trailer` cell at byte offset 32 is ever
//! re-written, by the commit protocol's final 8-byte publish. Trailers
//! are 512-byte immutable records, one per committed revision:
//!
//! ```text
//! header:  magic[8] "pstore\0\0" | major,minor,patch,reserved: 4 x u16
//!          | uuid[16] | latest_trailer: u64 | creation_time_ms: u64
//!          | zero padding to 256
//! trailer: magic[8] "pTrailer" | revision: u64 | prev_trailer: u64
//!          | file_size: u64 | time_ms: u64 | index_roots[6]: u64
//!          | crc32c: u32 | zero padding | magic[8] "pstore:T" at 504
//! ```
//!
//! The trailer checksum is CRC-32/iSCSI over the whole 512-byte record
//! with the checksum field zeroed. Root slots hold tagged node words,
//! 0 for an empty index.

use crc::{Crc, CRC_32_ISCSI};
use uuid::Uuid;

use crate::{store::IndexKind, util, Result};

pub const HEADER_SIZE: u64 = 256;
pub const TRAILER_SIZE: u64 = 512;
/// File offset of the header's latest-trailer cell, the single atomic
/// publish point of the commit protocol.
pub const PUBLISH_FPOS: u64 = 32;

pub const MAGIC: [u8; 8] = *b"pstore\0\0";
pub const TRAILER_MAGIC_BEGIN: [u8; 8] = *b"pTrailer";
pub const TRAILER_MAGIC_END: [u8; 8] = *b"pstore:T";
pub const VERSION: (u16, u16, u16) = (1, 0, 0);

const TRAILER_CRC_OFF: usize = 88;
const TRAILER_MAGIC_END_OFF: usize = 504;

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(bytes)
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    let mut bytes = [0_u8; 2];
    bytes.copy_from_slice(&buf[off..off + 2]);
    u16::from_le_bytes(bytes)
}

/// Database header, written once at creation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub version: (u16, u16, u16),
    pub uuid: Uuid,
    pub latest_trailer: u64,
    pub creation_time_ms: u64,
}

impl Header {
    /// Fresh header for a new database, pointing at the genesis trailer.
    pub fn new() -> Header {
        Header {
            version: VERSION,
            uuid: Uuid::new_v4(),
            latest_trailer: HEADER_SIZE,
            creation_time_ms: util::time_now_ms(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&self.version.0.to_le_bytes());
        buf.extend_from_slice(&self.version.1.to_le_bytes());
        buf.extend_from_slice(&self.version.2.to_le_bytes());
        buf.extend_from_slice(&0_u16.to_le_bytes()); // reserved
        buf.extend_from_slice(self.uuid.as_bytes());
        buf.extend_from_slice(&self.latest_trailer.to_le_bytes());
        buf.extend_from_slice(&self.creation_time_ms.to_le_bytes());
        buf.resize(HEADER_SIZE as usize, 0);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < (HEADER_SIZE as usize) {
            return err_at!(InvalidFile, msg: "header truncated {}", buf.len());
        }
        if buf[..8] != MAGIC {
            return err_at!(BadMagic, msg: "{:?}", &buf[..8]);
        }
        let version = (read_u16(buf, 8), read_u16(buf, 10), read_u16(buf, 12));
        if version.0 != VERSION.0 {
            return err_at!(BadVersion, msg: "{}.{}.{}", version.0, version.1, version.2);
        }
        let mut bytes = [0_u8; 16];
        bytes.copy_from_slice(&buf[16..32]);

        let header = Header {
            version,
            uuid: Uuid::from_bytes(bytes),
            latest_trailer: read_u64(buf, 32),
            creation_time_ms: read_u64(buf, 40),
        };
        Ok(header)
    }
}

/// Commit record for one revision. Immutable once written; becomes the
/// revision the moment the header's latest-trailer cell points at it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Trailer {
    pub revision: u64,
    pub prev_trailer: u64, // 0 for the genesis trailer
    pub file_size: u64,
    pub time_ms: u64,
    pub index_roots: [u64; IndexKind::COUNT],
}

impl Trailer {
    pub fn genesis(time_ms: u64) -> Trailer {
        Trailer {
            revision: 0,
            prev_trailer: 0,
            file_size: HEADER_SIZE + TRAILER_SIZE,
            time_ms,
            index_roots: [0; IndexKind::COUNT],
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TRAILER_SIZE as usize);
        buf.extend_from_slice(&TRAILER_MAGIC_BEGIN);
        buf.extend_from_slice(&self.revision.to_le_bytes());
        buf.extend_from_slice(&self.prev_trailer.to_le_bytes());
        buf.extend_from_slice(&self.file_size.to_le_bytes());
        buf.extend_from_slice(&self.time_ms.to_le_bytes());
        for root in self.index_roots.iter() {
            buf.extend_from_slice(&root.to_le_bytes());
        }
        buf.extend_from_slice(&0_u32.to_le_bytes()); // crc, patched below
        buf.resize(TRAILER_MAGIC_END_OFF, 0);
        buf.extend_from_slice(&TRAILER_MAGIC_END);

        let crc = CASTAGNOLI.checksum(&buf);
        buf[TRAILER_CRC_OFF..TRAILER_CRC_OFF + 4].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Trailer> {
        if buf.len() < (TRAILER_SIZE as usize) {
            return err_at!(InvalidFile, msg: "trailer truncated {}", buf.len());
        }
        let buf = &buf[..(TRAILER_SIZE as usize)];
        if buf[..8] != TRAILER_MAGIC_BEGIN {
            return err_at!(BadMagic, msg: "trailer-begin {:?}", &buf[..8]);
        }
        if buf[TRAILER_MAGIC_END_OFF..] != TRAILER_MAGIC_END {
            return err_at!(BadMagic, msg: "trailer-end {:?}", &buf[TRAILER_MAGIC_END_OFF..]);
        }

        let crc = {
            let mut bytes = [0_u8; 4];
            bytes.copy_from_slice(&buf[TRAILER_CRC_OFF..TRAILER_CRC_OFF + 4]);
            u32::from_le_bytes(bytes)
        };
        let mut copy = buf.to_vec();
        copy[TRAILER_CRC_OFF..TRAILER_CRC_OFF + 4].copy_from_slice(&[0; 4]);
        let computed = CASTAGNOLI.checksum(&copy);
        if crc != computed {
            return err_at!(BadChecksum, msg: "trailer {:x} != {:x}", crc, computed);
        }

        let mut index_roots = [0_u64; IndexKind::COUNT];
        for (i, root) in index_roots.iter_mut().enumerate() {
            *root = read_u64(buf, 40 + (i * 8));
        }

        let trailer = Trailer {
            revision: read_u64(buf, 8),
            prev_trailer: read_u64(buf, 16),
            file_size: read_u64(buf, 24),
            time_ms: read_u64(buf, 32),
            index_roots,
        };
        Ok(trailer)
    }
}

#[cfg(test)]
#[path = "format_test.rs"]
mod format_test;
