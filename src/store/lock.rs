//! Writer lock and heartbeat for the companion `<db>.lock` file.
//!
//! The writer holds an exclusive advisory lock on the lock file for its
//! whole session and refreshes a millisecond timestamp at offset 0 from
//! a heartbeat thread. The advisory lock dies with its holder, so a
//! contender seeing a heartbeat older than the grace period simply
//! retries the non-blocking lock; a successful retry is the steal.

use fs2::FileExt;
use log::warn;

use std::{
    ffi, fs, io, path,
    sync::atomic::{AtomicBool, Ordering::SeqCst},
    sync::{Arc, Condvar, Mutex},
    thread, time,
};

use crate::{store::Config, util, Result};

pub(crate) struct LockFile {
    file: fs::File,
    lost: Arc<AtomicBool>,
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<thread::JoinHandle<()>>,
}

/// Compose the lock-file location for database at `db`.
pub(crate) fn lock_location(db: &ffi::OsStr) -> ffi::OsString {
    let mut loc = db.to_os_string();
    loc.push(".lock");
    loc
}

impl LockFile {
    /// Acquire the writer lock for database at `db`, stealing an
    /// abandoned one. Fail with `AlreadyLocked` while a live writer
    /// holds it.
    pub fn acquire(db: &ffi::OsStr, config: &Config) -> Result<LockFile> {
        let loc = lock_location(db);
        let file = {
            let os_file = path::Path::new(&loc);
            if let Some(parent) = os_file.parent() {
                err_at!(IOError, fs::create_dir_all(parent))?;
            }
            let mut opts = fs::OpenOptions::new();
            err_at!(IOError, opts.read(true).write(true).create(true).open(os_file))?
        };

        match file.try_lock_exclusive() {
            Ok(()) => (),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                let age = heartbeat_age(&loc);
                if age < config.lock_grace_ms {
                    return err_at!(
                        AlreadyLocked, msg: "{:?} held, heartbeat {}ms old", loc, age
                    );
                }
                warn!(target: "pstore", "stealing lock {:?}, heartbeat {}ms old", loc, age);
                match file.try_lock_exclusive() {
                    Ok(()) => (),
                    Err(_) => {
                        return err_at!(AlreadyLocked, msg: "{:?} still held", loc)
                    }
                }
            }
            Err(err) => return err_at!(IOError, Err(err)),
        }

        beat(&file)?;

        let lost = Arc::new(AtomicBool::new(false));
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let handle = {
            let file = err_at!(IOError, file.try_clone())?;
            let (lost, stop) = (Arc::clone(&lost), Arc::clone(&stop));
            let interval = time::Duration::from_millis(config.heartbeat_interval_ms);
            thread::spawn(move || heartbeat_loop(file, interval, lost, stop))
        };

        let val = LockFile {
            file,
            lost,
            stop,
            handle: Some(handle),
        };
        Ok(val)
    }

    /// Whether the heartbeat failed; all subsequent writes must fail.
    pub fn is_lost(&self) -> bool {
        self.lost.load(SeqCst)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        {
            let (flag, cvar) = &*self.stop;
            if let Ok(mut stopped) = flag.lock() {
                *stopped = true;
                cvar.notify_all();
            }
        }
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
        self.file.unlock().ok();
    }
}

fn heartbeat_loop(
    file: fs::File,
    interval: time::Duration,
    lost: Arc<AtomicBool>,
    stop: Arc<(Mutex<bool>, Condvar)>,
) {
    let (flag, cvar) = &*stop;
    let mut stopped = match flag.lock() {
        Ok(guard) => guard,
        Err(_) => return,
    };
    loop {
        if *stopped {
            return;
        }
        stopped = match cvar.wait_timeout(stopped, interval) {
            Ok((guard, _)) => guard,
            Err(_) => return,
        };
        if *stopped {
            return;
        }
        if let Err(err) = beat(&file) {
            warn!(target: "pstore", "heartbeat failed: {}", err);
            lost.store(true, SeqCst);
            return;
        }
    }
}

fn beat(file: &fs::File) -> Result<()> {
    use std::io::{Seek, SeekFrom};

    let now = util::time_now_ms().to_le_bytes();
    let mut fd = file;
    err_at!(IOError, fd.seek(SeekFrom::Start(0)))?;
    write_file!(fd, &now, file, "heartbeat")?;
    err_at!(IOError, file.sync_all())?;
    Ok(())
}

// Age of the heartbeat in `loc`, milliseconds. An unreadable or empty
// lock file counts as infinitely stale.
fn heartbeat_age(loc: &ffi::OsStr) -> u64 {
    use std::io::{Seek, SeekFrom};

    let mut fd = match util::open_file_r(loc) {
        Ok(fd) => fd,
        Err(_) => return u64::MAX,
    };
    let buf: Vec<u8> = match read_file!(fd, SeekFrom::Start(0), 8, "heartbeat") {
        Ok(buf) => buf,
        Err(_) => return u64::MAX,
    };
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&buf);
    util::time_now_ms().saturating_sub(u64::from_le_bytes(bytes))
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod lock_test;
