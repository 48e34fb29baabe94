//! Add a key,value pair to a pstore repository's `write` index,
//! creating the repository when it does not exist.

use structopt::StructOpt;

use std::{ffi, path};

use pstore::{AccessMode, Config, Ext, Store};

/// pstore write utility.
#[derive(Clone, StructOpt)]
#[structopt(name = "pwrite")]
pub struct Opt {
    /// Path of the pstore repository.
    #[structopt(parse(from_os_str))]
    repository: ffi::OsString,

    /// Key within the 'write' index.
    key: String,

    /// Value to store under the key.
    value: String,
}

fn main() {
    let opts = Opt::from_args();
    std::process::exit(match run(opts) {
        Ok(_revision) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            1
        }
    });
}

fn run(opts: Opt) -> pstore::Result<u64> {
    let db = match path::Path::new(&opts.repository).exists() {
        true => Store::open(&opts.repository, AccessMode::Writable)?,
        false => Store::create(&opts.repository, Config::new())?,
    };

    let mut tx = db.begin()?;
    let value = opts.value.as_bytes();
    let ext = match value.len() {
        0 => Ext::new(0, 0),
        n => {
            let (buf, addr) = tx.alloc_rw(n as u64, 1)?;
            buf.copy_from_slice(value);
            Ext::new(addr, n as u64)
        }
    };
    tx.writes().insert_or_assign(opts.key.into_bytes(), ext)?;
    tx.commit()
}
