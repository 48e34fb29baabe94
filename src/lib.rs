//! Package implement an append-only, content-addressed, persistent
//! key,value store around a memory-mapped single-file database.
//!
//! Writers publish changes as atomic [transactions][Transaction] that
//! extend the file; readers observe immutable [snapshots][Snapshot]
//! identified by monotonically increasing revision numbers. Durability
//! and crash-safety come from the strictly append-only layout and a
//! durably-written trailer record that commits each revision.
//!
//! A database carries a closed set of named indexes - `names`,
//! `fragments`, `compilations`, `debug_line_headers`, `write` and
//! `strings` - each a persistent, copy-on-write [HAMT][crate::hamt].
//! Typical write path, mirroring the `write` tool:
//!
//! ```ignore
//! let mut db = Store::open(path, AccessMode::Writable)?;
//! let mut tx = db.begin()?;
//! let (buf, addr) = tx.alloc_rw(12, 1)?;
//! buf.copy_from_slice(b"hello world\n");
//! tx.writes().insert_or_assign("key".as_bytes().to_vec(), Ext::new(addr, 12))?;
//! tx.commit()?;
//! ```
//!
//! And the read path:
//!
//! ```ignore
//! let db = Store::open(path, AccessMode::ReadOnly)?;
//! let snap = db.snapshot(Revision::Head)?;
//! let ext = snap.writes().get(&"key".as_bytes().to_vec())?;
//! ```

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways,
///
/// ```ignore
/// use crate::Error;
/// err_at!(Fatal, msg: "fatal message");
/// err_at!(IOError, std::fs::read(file_path));
/// err_at!(IOError, std::fs::read(file_path), "reading {:?}", file_path);
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

#[macro_use]
pub mod util;
pub mod hamt;
pub mod store;

pub use crate::hamt::Digest;
pub use crate::store::{
    str_to_revision, AccessMode, Config, Ext, IndexKind, Revision, Snapshot, Store,
    Transaction, View,
};

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location, and a custom message.
pub enum Error {
    Fatal(String, String),
    IOError(String, String),
    InvalidInput(String, String),
    InvalidFile(String, String),
    OutOfSpace(String, String),
    AlignmentOverflow(String, String),
    BadMagic(String, String),
    BadVersion(String, String),
    BadChecksum(String, String),
    AddressOutOfRange(String, String),
    CorruptNode(String, String),
    AlreadyLocked(String, String),
    LockLost(String, String),
    UnknownRevision(String, String),
    InvalidRevision(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, m) => write!(f, "{} Fatal: {}", p, m),
            IOError(p, m) => write!(f, "{} IOError: {}", p, m),
            InvalidInput(p, m) => write!(f, "{} InvalidInput: {}", p, m),
            InvalidFile(p, m) => write!(f, "{} InvalidFile: {}", p, m),
            OutOfSpace(p, m) => write!(f, "{} OutOfSpace: {}", p, m),
            AlignmentOverflow(p, m) => write!(f, "{} AlignmentOverflow: {}", p, m),
            BadMagic(p, m) => write!(f, "{} BadMagic: {}", p, m),
            BadVersion(p, m) => write!(f, "{} BadVersion: {}", p, m),
            BadChecksum(p, m) => write!(f, "{} BadChecksum: {}", p, m),
            AddressOutOfRange(p, m) => write!(f, "{} AddressOutOfRange: {}", p, m),
            CorruptNode(p, m) => write!(f, "{} CorruptNode: {}", p, m),
            AlreadyLocked(p, m) => write!(f, "{} AlreadyLocked: {}", p, m),
            LockLost(p, m) => write!(f, "{} LockLost: {}", p, m),
            UnknownRevision(p, m) => write!(f, "{} UnknownRevision: {}", p, m),
            InvalidRevision(p, m) => write!(f, "{} InvalidRevision: {}", p, m),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}
