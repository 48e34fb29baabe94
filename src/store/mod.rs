//! Module implement the storage engine - address-space management,
//! transactions, commit protocol and snapshots.
//!
//! A database is a single file. A fixed 256-byte header at offset 0
//! carries the identity of the store and the address of the latest
//! trailer. Each committed revision is described by an immutable 512-byte
//! trailer holding the root of every index at that revision and a link to
//! the previous trailer. Committing appends data and a new trailer,
//! syncs, and then publishes by re-writing the header's trailer address.

use std::fmt;

pub(crate) mod alloc;
mod db;
pub(crate) mod format;
mod lock;
mod region;
mod snapshot;
mod tx;

pub use db::Store;
pub(crate) use db::Inner;
pub use region::View;
pub use snapshot::{IndexIter, IndexReader, Snapshot};
pub use tx::{IndexWriter, Transaction};

/// Default size of a mapped region, 64MB.
pub const REGION_SIZE: u64 = 64 * 1024 * 1024;
/// Default cadence at which the writer refreshes the lock-file heartbeat.
pub const HEARTBEAT_INTERVAL_MS: u64 = 1_000;
/// Default age beyond which a lock-file heartbeat is considered stale and
/// the lock abandoned.
pub const LOCK_GRACE_MS: u64 = 30_000;
/// Maximum alignment a caller can request from the allocator.
pub const MAX_ALIGN: u64 = 4096;

/// A contiguous, immutable byte-range within some committed revision.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ext {
    pub addr: u64,
    pub size: u64,
}

impl Ext {
    pub fn new(addr: u64, size: u64) -> Ext {
        Ext { addr, size }
    }
}

/// Closed enumeration of the indexes maintained per revision. The
/// variant order is the trailer's root-slot order and is part of the
/// on-disk format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexKind {
    Names,
    Fragments,
    Compilations,
    DebugLineHeaders,
    Write,
    Strings,
}

impl IndexKind {
    pub const COUNT: usize = 6;

    pub fn to_slot(&self) -> usize {
        match self {
            IndexKind::Names => 0,
            IndexKind::Fragments => 1,
            IndexKind::Compilations => 2,
            IndexKind::DebugLineHeaders => 3,
            IndexKind::Write => 4,
            IndexKind::Strings => 5,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            IndexKind::Names => write!(f, "names"),
            IndexKind::Fragments => write!(f, "fragments"),
            IndexKind::Compilations => write!(f, "compilations"),
            IndexKind::DebugLineHeaders => write!(f, "debug_line_headers"),
            IndexKind::Write => write!(f, "write"),
            IndexKind::Strings => write!(f, "strings"),
        }
    }
}

/// Database open mode. At most one [AccessMode::Writable] session exists
/// per database, guarded by the companion lock file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessMode {
    ReadOnly,
    Writable,
}

/// Identify a committed revision, either the latest or by number.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Revision {
    Head,
    Number(u64),
}

/// Convert a string to a [Revision]. Leading and trailing whitespace is
/// ignored, the text "head", regardless of case, becomes
/// [Revision::Head].
pub fn str_to_revision(s: &str) -> Option<Revision> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("head") {
        Some(Revision::Head)
    } else {
        s.parse::<u64>().ok().map(Revision::Number)
    }
}

/// Configuration for opening or creating a [Store].
///
/// Configuration governs the mapping granularity and the writer-lock
/// heartbeat, it is not persisted with the database.
#[derive(Clone, Debug)]
pub struct Config {
    /// Size of a mapped region, must be a power of two, at least 4096.
    ///
    /// Default: [REGION_SIZE]
    pub region_size: u64,
    /// Cadence at which the writer refreshes the lock-file heartbeat.
    ///
    /// Default: [HEARTBEAT_INTERVAL_MS]
    pub heartbeat_interval_ms: u64,
    /// Age beyond which a heartbeat is stale and the lock abandoned.
    ///
    /// Default: [LOCK_GRACE_MS]
    pub lock_grace_ms: u64,
}

impl<'a> arbitrary::Arbitrary<'a> for Config {
    fn arbitrary(u: &mut arbitrary::Unstructured) -> arbitrary::Result<Self> {
        let region_size = *u.choose(&[4096_u64, 65536, 1 << 20, REGION_SIZE])?;
        let heartbeat_interval_ms = *u.choose(&[100_u64, 500, HEARTBEAT_INTERVAL_MS])?;
        let lock_grace_ms = *u.choose(&[5_000_u64, LOCK_GRACE_MS])?;

        let config = Config {
            region_size,
            heartbeat_interval_ms,
            lock_grace_ms,
        };
        Ok(config)
    }
}

impl Config {
    /// Create a new configuration value, use the `set_*` methods to
    /// change individual parameters.
    pub fn new() -> Config {
        Config {
            region_size: REGION_SIZE,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            lock_grace_ms: LOCK_GRACE_MS,
        }
    }

    pub fn set_region_size(&mut self, region_size: u64) -> &mut Self {
        self.region_size = region_size;
        self
    }

    pub fn set_heartbeat(&mut self, interval_ms: u64, grace_ms: u64) -> &mut Self {
        self.heartbeat_interval_ms = interval_ms;
        self.lock_grace_ms = grace_ms;
        self
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if !self.region_size.is_power_of_two() || self.region_size < 4096 {
            return err_at!(InvalidInput, msg: "region_size {}", self.region_size);
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_interval_ms >= self.lock_grace_ms {
            return err_at!(
                InvalidInput, msg: "heartbeat {} vs grace {}",
                self.heartbeat_interval_ms, self.lock_grace_ms
            );
        }
        Ok(())
    }
}
