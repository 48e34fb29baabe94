//! Read a value from a pstore repository's `names` or `strings` index.

use structopt::StructOpt;

use std::{
    convert::TryFrom,
    ffi,
    io::{self, Write},
};

use pstore::{AccessMode, Revision, Store};

/// pstore read utility.
#[derive(Clone, StructOpt)]
#[structopt(name = "pread")]
pub struct Opt {
    /// The starting revision number (or 'HEAD').
    #[structopt(short = "r", long = "revision", default_value = "HEAD")]
    revision: String,

    /// Read from the 'strings' index rather than the 'names' index.
    #[structopt(short = "s", long = "strings")]
    string_mode: bool,

    /// Path of the pstore repository to be read.
    #[structopt(parse(from_os_str))]
    repository: ffi::OsString,

    /// Key to look up.
    key: String,
}

fn main() {
    let opts = Opt::from_args();
    let key = opts.key.clone();
    let code = match run(opts) {
        Ok(true) => 0,
        Ok(false) => {
            eprintln!("{}: not found.", key);
            1
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            1
        }
    };
    std::process::exit(code);
}

fn run(opts: Opt) -> pstore::Result<bool> {
    let rev = Revision::try_from(opts.revision.as_str())?;

    let db = Store::open(&opts.repository, AccessMode::ReadOnly)?;
    let snap = db.snapshot(rev)?;

    let index = match opts.string_mode {
        true => snap.strings(),
        false => snap.names(),
    };
    match index.get(&opts.key)? {
        Some(addr) => {
            let value = snap.read_interned(addr)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(&value).ok();
            Ok(true)
        }
        None => Ok(false),
    }
}
