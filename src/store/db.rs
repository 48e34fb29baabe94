//! Database handle - creation, open, revision resolution.

use log::{debug, warn};

use std::{
    convert::TryFrom,
    ffi, fs,
    sync::atomic::AtomicBool,
    sync::{Arc, Mutex},
};

use crate::{
    hamt,
    store::{
        format::{self, Header, Trailer},
        lock::LockFile,
        region::RegionMap,
        AccessMode, Config, Revision, Snapshot, Transaction, View,
    },
    util, Result,
};

/// Handle to a single-file database. Cloning the handle shares the
/// underlying mapping; clones can resolve snapshots concurrently from
/// any thread while at most one transaction is open.
pub struct Store {
    pub(crate) inner: Arc<Inner>,
}

impl Clone for Store {
    fn clone(&self) -> Store {
        Store {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct Inner {
    pub loc: ffi::OsString,
    pub mode: AccessMode,
    pub config: Config,
    pub header: Header,
    pub regions: RegionMap,
    pub wfd: Option<Mutex<fs::File>>,
    pub lock: Option<LockFile>,
    pub tx_active: AtomicBool,
}

impl Store {
    /// Create a fresh database at `loc`, purging any existing file, and
    /// leave it open writable. The genesis revision 0 carries six empty
    /// indexes.
    pub fn create(loc: &ffi::OsStr, config: Config) -> Result<Store> {
        config.validate()?;

        let lock = LockFile::acquire(loc, &config)?;
        let mut fd = util::create_file_rw(loc)?;

        let header = Header::new();
        let genesis = Trailer::genesis(header.creation_time_ms);
        util::write_at(&mut fd, 0, &header.encode())?;
        util::write_at(&mut fd, format::HEADER_SIZE, &genesis.encode())?;
        err_at!(IOError, fd.sync_all())?;

        debug!(target: "pstore", "created {:?} uuid {}", loc, header.uuid);

        let regions = RegionMap::new(err_at!(IOError, fd.try_clone())?, config.region_size);
        let inner = Inner {
            loc: loc.to_os_string(),
            mode: AccessMode::Writable,
            config,
            header,
            regions,
            wfd: Some(Mutex::new(fd)),
            lock: Some(lock),
            tx_active: AtomicBool::new(false),
        };
        Ok(Store { inner: Arc::new(inner) })
    }

    /// Open an existing database at `loc` with default configuration.
    pub fn open(loc: &ffi::OsStr, mode: AccessMode) -> Result<Store> {
        Store::open_with(loc, mode, Config::new())
    }

    /// Open an existing database. [AccessMode::Writable] acquires the
    /// writer lock and repairs a torn tail left by a crashed writer.
    pub fn open_with(loc: &ffi::OsStr, mode: AccessMode, config: Config) -> Result<Store> {
        config.validate()?;

        let lock = match mode {
            AccessMode::Writable => Some(LockFile::acquire(loc, &config)?),
            AccessMode::ReadOnly => None,
        };
        let fd = match mode {
            AccessMode::Writable => util::open_file_rw(loc)?,
            AccessMode::ReadOnly => util::open_file_r(loc)?,
        };

        let file_len = err_at!(IOError, fd.metadata())?.len();
        if file_len < format::HEADER_SIZE + format::TRAILER_SIZE {
            return err_at!(InvalidFile, msg: "{:?} length {}", loc, file_len);
        }

        let regions = RegionMap::new(err_at!(IOError, fd.try_clone())?, config.region_size);
        let header = Header::decode(&regions.view(0, format::HEADER_SIZE, file_len)?)?;

        let inner = Inner {
            loc: loc.to_os_string(),
            mode,
            config,
            header,
            regions,
            wfd: match mode {
                AccessMode::Writable => Some(Mutex::new(fd)),
                AccessMode::ReadOnly => None,
            },
            lock,
            tx_active: AtomicBool::new(false),
        };

        let (_, trailer) = inner.published()?;
        if file_len < trailer.file_size {
            return err_at!(
                InvalidFile, msg: "{:?} length {} < committed {}", loc, file_len, trailer.file_size
            );
        }
        if mode == AccessMode::Writable && file_len > trailer.file_size {
            // tail torn off by a crashed writer, never published.
            warn!(
                target: "pstore",
                "truncating {:?} from {} to {}", loc, file_len, trailer.file_size
            );
            inner.regions.grow(trailer.file_size)?;
        }

        debug!(
            target: "pstore",
            "opened {:?} {:?} revision {}", loc, mode, trailer.revision
        );
        Ok(Store { inner: Arc::new(inner) })
    }

    /// UUID minted when the database was created.
    pub fn to_uuid(&self) -> uuid::Uuid {
        self.inner.header.uuid
    }

    /// Resolve `rev` to a read-only snapshot. Walks the trailer chain
    /// from the published head, verifying each trailer's checksum.
    pub fn snapshot(&self, rev: Revision) -> Result<Snapshot> {
        let (mut addr, mut trailer) = self.inner.published()?;
        let limit = trailer.file_size;
        if let Revision::Number(n) = rev {
            if n > trailer.revision {
                return err_at!(
                    UnknownRevision, msg: "{} beyond head {}", n, trailer.revision
                );
            }
            while trailer.revision > n {
                if trailer.prev_trailer == 0 {
                    return err_at!(UnknownRevision, msg: "{}", n);
                }
                addr = trailer.prev_trailer;
                trailer = self.inner.trailer_at(addr, limit)?;
            }
            if trailer.revision != n {
                return err_at!(UnknownRevision, msg: "{}", n);
            }
        }
        Ok(Snapshot::new(Arc::clone(&self.inner), addr, trailer))
    }

    /// Start a transaction. Fails on read-only handles and while another
    /// transaction is open on this database.
    pub fn begin(&self) -> Result<Transaction> {
        Transaction::begin(Arc::clone(&self.inner))
    }
}

impl Inner {
    /// Read the published trailer, the committed head of the database.
    pub fn published(&self) -> Result<(u64, Trailer)> {
        let file_len = self.regions.file_len()?;
        let addr = {
            let view = self.regions.view(format::PUBLISH_FPOS, 8, format::HEADER_SIZE)?;
            let mut bytes = [0_u8; 8];
            bytes.copy_from_slice(&view);
            u64::from_le_bytes(bytes)
        };
        if addr < format::HEADER_SIZE {
            return err_at!(AddressOutOfRange, msg: "published trailer at {}", addr);
        }
        let trailer = self.trailer_at(addr, file_len)?;
        Ok((addr, trailer))
    }

    pub fn trailer_at(&self, addr: u64, limit: u64) -> Result<Trailer> {
        let view = self.regions.view(addr, format::TRAILER_SIZE, limit)?;
        Trailer::decode(&view)
    }
}

/// Byte source bounded by a revision's committed file size. The unit the
/// trie walks committed nodes through.
#[derive(Clone, Copy)]
pub struct StoreSource<'a> {
    pub(crate) inner: &'a Inner,
    pub(crate) end: u64,
}

impl<'a> hamt::Source for StoreSource<'a> {
    fn view_from(&self, addr: u64) -> Result<View> {
        self.inner.regions.view_from(addr, self.end)
    }
}

impl TryFrom<&str> for Revision {
    type Error = crate::Error;

    fn try_from(s: &str) -> Result<Revision> {
        match crate::store::str_to_revision(s) {
            Some(rev) => Ok(rev),
            None => err_at!(InvalidRevision, msg: "{:?}", s),
        }
    }
}
