//! Transaction engine - allocation, index mutation, commit protocol.

use log::debug;

use std::sync::{atomic::Ordering::SeqCst, Arc};

use crate::{
    hamt::{Digest, Key, Map, Value},
    store::{
        alloc::Allocator,
        db::StoreSource,
        format::{self, Trailer},
        AccessMode, Ext, IndexKind, Inner, View,
    },
    util, Result,
};

/// An open transaction. Exactly one transaction exists at a time per
/// database; dropping the handle without committing aborts it and leaves
/// the file bit-exact at the previous revision.
///
/// Commit protocol: flush dirty index nodes through the allocator,
/// append the new trailer, grow the file, write the scratch buffer,
/// sync; then publish with a single aligned 8-byte write of the header's
/// trailer cell and sync again. A crash anywhere before the publish
/// leaves the previous revision as the head.
pub struct Transaction {
    inner: Arc<Inner>,
    alloc: Allocator,
    prev_addr: u64,
    prev: Trailer,
    names: Option<Map<String, u64>>,
    fragments: Option<Map<Digest, Ext>>,
    compilations: Option<Map<Digest, Ext>>,
    debug_line_headers: Option<Map<Digest, Ext>>,
    writes: Option<Map<Vec<u8>, Ext>>,
    strings: Option<Map<String, u64>>,
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.inner.tx_active.store(false, SeqCst);
    }
}

impl Transaction {
    pub(crate) fn begin(inner: Arc<Inner>) -> Result<Transaction> {
        if inner.mode != AccessMode::Writable {
            return err_at!(InvalidInput, msg: "begin on read-only store");
        }
        check_lock(&inner)?;
        if inner.tx_active.compare_exchange(false, true, SeqCst, SeqCst).is_err() {
            return err_at!(Fatal, msg: "transaction already open on {:?}", inner.loc);
        }

        let (prev_addr, prev) = match inner.published() {
            Ok(val) => val,
            Err(err) => {
                inner.tx_active.store(false, SeqCst);
                return Err(err);
            }
        };
        let alloc = Allocator::new(prev.file_size, inner.config.region_size);

        debug!(
            target: "pstore",
            "begin on {:?}, frontier {}", inner.loc, prev.file_size
        );

        let val = Transaction {
            inner,
            alloc,
            prev_addr,
            prev,
            names: None,
            fragments: None,
            compilations: None,
            debug_line_headers: None,
            writes: None,
            strings: None,
        };
        Ok(val)
    }

    /// Reserve `size` writable bytes aligned to `align`. Return the
    /// scratch bytes and the store address they will land at on commit.
    pub fn alloc_rw(&mut self, size: u64, align: u64) -> Result<(&mut [u8], u64)> {
        check_lock(&self.inner)?;
        let addr = self.alloc.alloc(size, align)?;
        Ok((self.alloc.as_mut(addr, size), addr))
    }

    /// Read `size` bytes at `addr` - committed bytes through the region
    /// mapping, uncommitted bytes out of this transaction's scratch
    /// space.
    pub fn alloc_ro(&self, addr: u64, size: u64) -> Result<View> {
        if addr >= self.alloc.to_start() {
            match self.alloc.scratch(addr, size) {
                Some(data) => Ok(View::Owned { data: data.to_vec() }),
                None => err_at!(
                    AddressOutOfRange, msg: "{}+{} beyond frontier {}",
                    addr, size, self.alloc.to_hwm()
                ),
            }
        } else {
            self.inner.regions.view(addr, size, self.prev.file_size)
        }
    }

    pub fn names(&mut self) -> IndexWriter<String, u64> {
        let root = self.prev.index_roots[IndexKind::Names.to_slot()];
        let src = StoreSource { inner: self.inner.as_ref(), end: self.prev.file_size };
        let map = self.names.get_or_insert_with(|| Map::from_root(root));
        IndexWriter { map, src }
    }

    pub fn fragments(&mut self) -> IndexWriter<Digest, Ext> {
        let root = self.prev.index_roots[IndexKind::Fragments.to_slot()];
        let src = StoreSource { inner: self.inner.as_ref(), end: self.prev.file_size };
        let map = self.fragments.get_or_insert_with(|| Map::from_root(root));
        IndexWriter { map, src }
    }

    pub fn compilations(&mut self) -> IndexWriter<Digest, Ext> {
        let root = self.prev.index_roots[IndexKind::Compilations.to_slot()];
        let src = StoreSource { inner: self.inner.as_ref(), end: self.prev.file_size };
        let map = self.compilations.get_or_insert_with(|| Map::from_root(root));
        IndexWriter { map, src }
    }

    pub fn debug_line_headers(&mut self) -> IndexWriter<Digest, Ext> {
        let root = self.prev.index_roots[IndexKind::DebugLineHeaders.to_slot()];
        let src = StoreSource { inner: self.inner.as_ref(), end: self.prev.file_size };
        let map = self.debug_line_headers.get_or_insert_with(|| Map::from_root(root));
        IndexWriter { map, src }
    }

    pub fn writes(&mut self) -> IndexWriter<Vec<u8>, Ext> {
        let root = self.prev.index_roots[IndexKind::Write.to_slot()];
        let src = StoreSource { inner: self.inner.as_ref(), end: self.prev.file_size };
        let map = self.writes.get_or_insert_with(|| Map::from_root(root));
        IndexWriter { map, src }
    }

    pub fn strings(&mut self) -> IndexWriter<String, u64> {
        let root = self.prev.index_roots[IndexKind::Strings.to_slot()];
        let src = StoreSource { inner: self.inner.as_ref(), end: self.prev.file_size };
        let map = self.strings.get_or_insert_with(|| Map::from_root(root));
        IndexWriter { map, src }
    }

    /// Intern `val` into the `names` or `strings` index. Returns the
    /// address of the intern record, re-using an existing binding.
    pub fn intern(&mut self, kind: IndexKind, val: &str) -> Result<u64> {
        match kind {
            IndexKind::Names | IndexKind::Strings => (),
            kind => return err_at!(InvalidInput, msg: "intern into {} index", kind),
        }

        let key = val.to_string();
        let existing = match kind {
            IndexKind::Names => self.names().get(&key)?,
            _ => self.strings().get(&key)?,
        };
        if let Some(addr) = existing {
            return Ok(addr);
        }

        let mut record = vec![];
        util::encode_varint(val.len() as u64, &mut record);
        record.extend_from_slice(val.as_bytes());
        let (buf, addr) = self.alloc_rw(record.len() as u64, 1)?;
        buf.copy_from_slice(&record);

        match kind {
            IndexKind::Names => self.names().insert(key, addr)?,
            _ => self.strings().insert(key, addr)?,
        };
        Ok(addr)
    }

    /// Materialize the transaction as the next revision. Returns the new
    /// revision number.
    pub fn commit(mut self) -> Result<u64> {
        check_lock(&self.inner)?;

        let mut roots = self.prev.index_roots;
        if let Some(mut map) = self.names.take() {
            roots[IndexKind::Names.to_slot()] = map.flush(&mut self.alloc)?;
        }
        if let Some(mut map) = self.fragments.take() {
            roots[IndexKind::Fragments.to_slot()] = map.flush(&mut self.alloc)?;
        }
        if let Some(mut map) = self.compilations.take() {
            roots[IndexKind::Compilations.to_slot()] = map.flush(&mut self.alloc)?;
        }
        if let Some(mut map) = self.debug_line_headers.take() {
            roots[IndexKind::DebugLineHeaders.to_slot()] = map.flush(&mut self.alloc)?;
        }
        if let Some(mut map) = self.writes.take() {
            roots[IndexKind::Write.to_slot()] = map.flush(&mut self.alloc)?;
        }
        if let Some(mut map) = self.strings.take() {
            roots[IndexKind::Strings.to_slot()] = map.flush(&mut self.alloc)?;
        }

        let trailer_addr = self.alloc.alloc(format::TRAILER_SIZE, 8)?;
        let trailer = Trailer {
            revision: self.prev.revision + 1,
            prev_trailer: self.prev_addr,
            file_size: self.alloc.to_hwm(),
            time_ms: util::time_now_ms(),
            index_roots: roots,
        };
        self.alloc.write(trailer_addr, &trailer.encode());

        self.inner.regions.grow(trailer.file_size)?;
        {
            let wfd = match self.inner.wfd.as_ref() {
                Some(wfd) => wfd,
                None => return err_at!(Fatal, msg: "no write handle"),
            };
            let mut fd = err_at!(Fatal, wfd.lock())?;
            util::write_at(&mut fd, self.alloc.to_start(), self.alloc.as_buf())?;
            err_at!(IOError, fd.sync_all())?;
            // the previous revision stays the head up to this point.
            util::write_at(&mut fd, format::PUBLISH_FPOS, &trailer_addr.to_le_bytes())?;
            err_at!(IOError, fd.sync_all())?;
        }

        debug!(
            target: "pstore",
            "commit revision {} on {:?}, file_size {}",
            trailer.revision, self.inner.loc, trailer.file_size
        );
        Ok(trailer.revision)
    }

    /// Abort the transaction. Equivalent to dropping the handle.
    pub fn rollback(mut self) -> Result<()> {
        self.alloc.reset();
        self.names = None;
        self.fragments = None;
        self.compilations = None;
        self.debug_line_headers = None;
        self.writes = None;
        self.strings = None;
        debug!(target: "pstore", "rollback on {:?}", self.inner.loc);
        Ok(())
    }
}

fn check_lock(inner: &Inner) -> Result<()> {
    match &inner.lock {
        Some(lock) if lock.is_lost() => {
            err_at!(LockLost, msg: "writer lock lost on {:?}", inner.loc)
        }
        _ => Ok(()),
    }
}

/// Mutable handle over one index inside an open transaction.
/// Modifications are copy-on-write and stay in memory until commit.
pub struct IndexWriter<'a, K, V> {
    map: &'a mut Map<K, V>,
    src: StoreSource<'a>,
}

impl<'a, K, V> IndexWriter<'a, K, V>
where
    K: Key,
    V: Value,
{
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.map.get(&self.src, key)
    }

    /// Insert a new binding. An existing binding is left alone and
    /// returned.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.map.insert(&self.src, key, value)
    }

    /// Insert a new binding, replacing and returning an existing one.
    pub fn insert_or_assign(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.map.insert_or_assign(&self.src, key, value)
    }
}

#[cfg(test)]
#[path = "tx_test.rs"]
mod tx_test;
