//! Read-only view of one committed revision.

use std::{convert::TryFrom, marker::PhantomData, sync::Arc};

use crate::{
    hamt::{self, Digest, Key, Map, Value},
    store::{db::StoreSource, format::Trailer, Ext, IndexKind, Inner, View},
    util, Result,
};

/// Snapshot of the database at one committed revision. Reads are
/// lock-free and need no coordination with the writer; a snapshot keeps
/// observing its revision for as long as it is held.
pub struct Snapshot {
    inner: Arc<Inner>,
    addr: u64, // address of this revision's trailer
    trailer: Trailer,
}

impl Snapshot {
    pub(crate) fn new(inner: Arc<Inner>, addr: u64, trailer: Trailer) -> Snapshot {
        Snapshot { inner, addr, trailer }
    }

    pub fn to_revision(&self) -> u64 {
        self.trailer.revision
    }

    /// Store address of this revision's trailer.
    pub fn to_trailer_addr(&self) -> u64 {
        self.addr
    }

    pub fn to_file_size(&self) -> u64 {
        self.trailer.file_size
    }

    pub fn to_time_ms(&self) -> u64 {
        self.trailer.time_ms
    }

    /// Read the bytes of `ext`. The returned view stays valid for the
    /// life of the database handle.
    pub fn read(&self, ext: &Ext) -> Result<View> {
        self.inner.regions.view(ext.addr, ext.size, self.trailer.file_size)
    }

    /// Read an intern record, the value bytes behind a `names` or
    /// `strings` binding.
    pub fn read_interned(&self, addr: u64) -> Result<Vec<u8>> {
        let view = self.inner.regions.view_from(addr, self.trailer.file_size)?;
        let (len, m) = util::decode_varint(&view)?;
        let len = err_at!(CorruptNode, usize::try_from(len))?;
        if view.len() < m + len {
            return err_at!(CorruptNode, msg: "intern record truncated at {}", addr);
        }
        Ok(view[m..m + len].to_vec())
    }

    pub fn names(&self) -> IndexReader<String, u64> {
        self.index(IndexKind::Names)
    }

    pub fn fragments(&self) -> IndexReader<Digest, Ext> {
        self.index(IndexKind::Fragments)
    }

    pub fn compilations(&self) -> IndexReader<Digest, Ext> {
        self.index(IndexKind::Compilations)
    }

    pub fn debug_line_headers(&self) -> IndexReader<Digest, Ext> {
        self.index(IndexKind::DebugLineHeaders)
    }

    pub fn writes(&self) -> IndexReader<Vec<u8>, Ext> {
        self.index(IndexKind::Write)
    }

    pub fn strings(&self) -> IndexReader<String, u64> {
        self.index(IndexKind::Strings)
    }

    fn index<K, V>(&self, kind: IndexKind) -> IndexReader<K, V>
    where
        K: Key,
        V: Value,
    {
        IndexReader {
            src: StoreSource {
                inner: self.inner.as_ref(),
                end: self.trailer.file_size,
            },
            root: self.trailer.index_roots[kind.to_slot()],
            _key: PhantomData,
            _value: PhantomData,
        }
    }
}

/// Read-only handle over one index at one revision.
pub struct IndexReader<'a, K, V> {
    src: StoreSource<'a>,
    root: u64,
    _key: PhantomData<K>,
    _value: PhantomData<V>,
}

impl<'a, K, V> IndexReader<'a, K, V>
where
    K: Key,
    V: Value,
{
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        Map::from_root(self.root).get(&self.src, key)
    }

    /// Iterate the index in stable hash order.
    pub fn iter(&self) -> Result<IndexIter<'a, K, V>> {
        let iter = hamt::Iter::new(self.src, self.root)?;
        Ok(IndexIter { iter })
    }

    pub fn to_vec(&self) -> Result<Vec<(K, V)>> {
        self.iter()?.collect()
    }

    /// Entries in byte-lexicographic key order.
    pub fn to_sorted(&self) -> Result<Vec<(K, V)>>
    where
        K: Ord,
    {
        let mut entries = self.to_vec()?;
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

/// Iterator over one index at one revision, in stable hash order.
pub struct IndexIter<'a, K, V> {
    iter: hamt::Iter<StoreSource<'a>, K, V>,
}

impl<'a, K, V> Iterator for IndexIter<'a, K, V>
where
    K: Key,
    V: Value,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod snapshot_test;
