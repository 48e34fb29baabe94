//! Module implement a persistent, copy-on-write, Hash-Array-Mapped-Trie.
//!
//! Every named index in the store is a [Map] - a trie indexed by 64-bit
//! hash slices, where each internal node carries a bitmap and a compact
//! child array. Modifications copy the nodes along the modified path and
//! share every unchanged sub-tree with prior revisions. Tries are rooted
//! at a store address recorded in the revision's trailer; lookups walk
//! the committed nodes straight out of the memory-mapped file.
//!
//! Keys consume [FANOUT_BITS] bits of hash per level. Once the hash bits
//! are exhausted colliding keys land in a linear collision leaf.

use std::convert::TryFrom;

use crate::{store::Ext, store::View, util, Result};

mod map;
mod node;

pub use map::{Iter, Map};
pub(crate) use node::{Child, Node};

/// Hash bits consumed per trie level, giving a fan-out of 64.
pub const FANOUT_BITS: u32 = 6;
/// Maximum trie depth. Levels 0..=9 consume six hash bits each, level 10
/// consumes the final four. A leaf below level 10 is a collision leaf.
pub const MAX_DEPTH: usize = 11;
/// Number of entries a leaf can hold before it splits. Leaves at
/// [MAX_DEPTH] never split.
pub const LEAF_CAP: usize = 8;

pub(crate) fn hash_slice(hash: u64, depth: usize) -> u64 {
    (hash >> ((depth as u32) * FANOUT_BITS)) & 0x3f
}

/// Types that can serve committed bytes at a given store address.
pub trait Source {
    /// Return a view starting at `addr`, extending to the end of the
    /// containing region or to the source's visibility limit, whichever
    /// comes first.
    fn view_from(&self, addr: u64) -> Result<View>;
}

impl<'a, T> Source for &'a T
where
    T: Source,
{
    fn view_from(&self, addr: u64) -> Result<View> {
        (**self).view_from(addr)
    }
}

/// 128-bit content digest, supplied by callers of the content-addressed
/// indexes. The trie hash of a digest is the identity of its low 64 bits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Digest(pub u128);

impl Digest {
    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

// City-hash 128-bit digest folded to u64, same fold as CityHasher.
pub(crate) fn hash_bytes(bytes: &[u8]) -> u64 {
    let digest = cityhash_rs::cityhash_110_128(bytes);
    ((digest >> 64) as u64) ^ ((digest & 0xFFFF_FFFF_FFFF_FFFF) as u64)
}

/// Trie keys. Encoding is a LEB128 length followed by the key bytes.
pub trait Key: Clone + PartialEq {
    /// 64-bit hash driving the trie path for this key.
    fn to_hash(&self) -> u64;

    fn encode(&self, buf: &mut Vec<u8>);

    /// Decode a key from the front of `buf`, return the key and the
    /// number of bytes consumed.
    fn decode(buf: &[u8]) -> Result<(Self, usize)>
    where
        Self: Sized;
}

/// Trie values, fixed-width encodings per index kind.
pub trait Value: Clone {
    fn encode(&self, buf: &mut Vec<u8>);

    fn decode(buf: &[u8]) -> Result<(Self, usize)>
    where
        Self: Sized;
}

impl Key for Vec<u8> {
    fn to_hash(&self) -> u64 {
        hash_bytes(self)
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        util::encode_varint(self.len() as u64, buf);
        buf.extend_from_slice(self);
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (len, m) = util::decode_varint(buf)?;
        let len = err_at!(CorruptNode, usize::try_from(len))?;
        if buf.len() < m + len {
            return err_at!(CorruptNode, msg: "key truncated {}/{}", buf.len(), m + len);
        }
        Ok((buf[m..m + len].to_vec(), m + len))
    }
}

impl Key for String {
    fn to_hash(&self) -> u64 {
        hash_bytes(self.as_bytes())
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        util::encode_varint(self.len() as u64, buf);
        buf.extend_from_slice(self.as_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (bytes, n) = <Vec<u8> as Key>::decode(buf)?;
        let key = err_at!(CorruptNode, String::from_utf8(bytes))?;
        Ok((key, n))
    }
}

impl Key for Digest {
    fn to_hash(&self) -> u64 {
        (self.0 & 0xFFFF_FFFF_FFFF_FFFF) as u64
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        util::encode_varint(16, buf);
        buf.extend_from_slice(&self.0.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (len, m) = util::decode_varint(buf)?;
        if len != 16 {
            return err_at!(CorruptNode, msg: "digest length {}", len);
        }
        if buf.len() < m + 16 {
            return err_at!(CorruptNode, msg: "digest truncated");
        }
        let mut bytes = [0_u8; 16];
        bytes.copy_from_slice(&buf[m..m + 16]);
        Ok((Digest(u128::from_le_bytes(bytes)), m + 16))
    }
}

impl Value for u64 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 8 {
            return err_at!(CorruptNode, msg: "value truncated {}/8", buf.len());
        }
        let mut bytes = [0_u8; 8];
        bytes.copy_from_slice(&buf[..8]);
        Ok((u64::from_le_bytes(bytes), 8))
    }
}

impl Value for Ext {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.addr.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 16 {
            return err_at!(CorruptNode, msg: "extent truncated {}/16", buf.len());
        }
        let (addr, _) = <u64 as Value>::decode(&buf[..8])?;
        let (size, _) = <u64 as Value>::decode(&buf[8..16])?;
        Ok((Ext::new(addr, size), 16))
    }
}
