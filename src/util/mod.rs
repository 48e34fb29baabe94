//! Module implement common utility functions and macros.

use std::{ffi, fs, path, time};

use crate::Result;

/// Read `n` bytes from file `fd` starting at `seek` position.
#[macro_export]
macro_rules! read_file {
    ($fd:expr, $seek:expr, $n:expr, $msg:expr) => {{
        use std::convert::TryFrom;
        use std::io::Read;

        match $fd.seek($seek) {
            Ok(_) => {
                let mut buf = vec![0; usize::try_from($n).unwrap()];
                match $fd.read(&mut buf) {
                    Ok(n) if buf.len() == n => Ok(buf),
                    Ok(n) => {
                        let m = buf.len();
                        err_at!(Fatal, msg: concat!($msg, " {}/{} at {:?}"), m, n, $seek)
                    }
                    Err(err) => err_at!(IOError, Err(err)),
                }
            }
            Err(err) => err_at!(IOError, Err(err)),
        }
    }};
}

/// Write `buffer` into file `fd` at current cursor position.
#[macro_export]
macro_rules! write_file {
    ($fd:expr, $buffer:expr, $file:expr, $msg:expr) => {{
        use std::io::Write;

        match err_at!(IOError, $fd.write($buffer))? {
            n if $buffer.len() == n => Ok(n),
            n => err_at!(
                Fatal, msg: "partial-wr {}, {:?}, {}/{}", $msg, $file, $buffer.len(), n
            ),
        }
    }};
}

/// Create a file for read/write access, purging the file if it already exist.
/// Missing parent directories are created.
pub fn create_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = {
        let os_file = path::Path::new(file);
        fs::remove_file(os_file).ok(); // NOTE: ignore remove errors.
        os_file
    };

    {
        let parent = match os_file.parent() {
            Some(parent) => Ok(parent),
            None => err_at!(InvalidFile, msg: "{:?}", file),
        }?;
        err_at!(IOError, fs::create_dir_all(parent))?;
    };

    let mut opts = fs::OpenOptions::new();
    Ok(err_at!(
        IOError,
        opts.read(true).write(true).create_new(true).open(os_file)
    )?)
}

/// Open an existing file for read/write access.
pub fn open_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    Ok(err_at!(IOError, opts.read(true).write(true).open(os_file))?)
}

/// Open an existing file for read access.
pub fn open_file_r(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    Ok(err_at!(
        IOError,
        fs::OpenOptions::new().read(true).open(os_file)
    )?)
}

/// Write `data` into file `fd` at absolute position `fpos`. Caller shall
/// sync the file.
pub fn write_at(fd: &mut fs::File, fpos: u64, data: &[u8]) -> Result<()> {
    use std::io::{Seek, SeekFrom};

    err_at!(IOError, fd.seek(SeekFrom::Start(fpos)))?;
    write_file!(fd, data, fd, "write_at")?;
    Ok(())
}

/// Current time as milliseconds since UNIX epoch.
pub fn time_now_ms() -> u64 {
    match time::UNIX_EPOCH.elapsed() {
        Ok(dur) => dur.as_millis() as u64,
        Err(_) => 0,
    }
}

/// Encode `n` in unsigned LEB128 format, appending to `buf`.
pub fn encode_varint(mut n: u64, buf: &mut Vec<u8>) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Decode an unsigned LEB128 value from `buf`. Return the value and the
/// number of bytes consumed. Encodings longer than 10 bytes, or carrying
/// bits beyond 64, are treated as corruption.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let (mut val, mut shift, mut n) = (0_u64, 0_u32, 0_usize);
    loop {
        if n >= buf.len() {
            return err_at!(CorruptNode, msg: "varint truncated at {}", n);
        }
        let byte = buf[n];
        n += 1;
        if shift == 63 && (byte & 0x7f) > 1 {
            return err_at!(CorruptNode, msg: "varint overflows u64");
        }
        val |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break Ok((val, n));
        }
        shift += 7;
        if shift > 63 {
            return err_at!(CorruptNode, msg: "varint exceeds 10 bytes");
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
