//! Address-space management for the single-file database.
//!
//! The file is covered by an ordered sequence of fixed-size regions,
//! mapped lazily and read-only. A region, once mapped, stays mapped for
//! the life of the database handle, growth only adds regions. All file
//! mutation goes through positioned writes on the file descriptor, the
//! OS page cache keeps the maps coherent with those writes.

use memmap2::MmapOptions;

use std::{cmp, fs, ops, sync::Arc, sync::RwLock};

use crate::Result;

pub(crate) struct RegionMap {
    file: fs::File,
    region_size: u64,
    regions: RwLock<Vec<Option<Arc<Region>>>>,
}

/// A single mapped region of the database file.
pub struct Region {
    mmap: memmap2::Mmap,
}

impl Region {
    fn as_slice(&self) -> &[u8] {
        &self.mmap
    }
}

impl RegionMap {
    pub fn new(file: fs::File, region_size: u64) -> RegionMap {
        RegionMap {
            file,
            region_size,
            regions: RwLock::new(vec![]),
        }
    }

    pub fn file_len(&self) -> Result<u64> {
        Ok(err_at!(IOError, self.file.metadata())?.len())
    }

    /// Extend the file to `new_size` bytes.
    pub fn grow(&self, new_size: u64) -> Result<()> {
        err_at!(OutOfSpace, self.file.set_len(new_size), "grow to {}", new_size)?;
        Ok(())
    }

    /// View of `len` bytes at `addr`. The range must fall within `limit`
    /// and must not straddle a region boundary.
    pub fn view(&self, addr: u64, len: u64, limit: u64) -> Result<View> {
        let end = match addr.checked_add(len) {
            Some(end) if end <= limit => end,
            _ => {
                return err_at!(
                    AddressOutOfRange, msg: "{}+{} beyond {}", addr, len, limit
                )
            }
        };
        if len == 0 {
            return Ok(View::Owned { data: vec![] });
        }
        let index = addr / self.region_size;
        if (end - 1) / self.region_size != index {
            return err_at!(
                AddressOutOfRange, msg: "{}+{} straddles region boundary", addr, len
            );
        }
        let region = self.region(index as usize)?;
        let off = (addr % self.region_size) as usize;
        Ok(View::Mapped { region, off, len: len as usize })
    }

    /// Open-ended view starting at `addr`, running to the end of the
    /// containing region or to `limit`, whichever comes first.
    pub fn view_from(&self, addr: u64, limit: u64) -> Result<View> {
        if addr >= limit {
            return err_at!(AddressOutOfRange, msg: "{} beyond {}", addr, limit);
        }
        let region_end = ((addr / self.region_size) + 1) * self.region_size;
        let len = cmp::min(region_end, limit) - addr;
        self.view(addr, len, limit)
    }

    fn region(&self, index: usize) -> Result<Arc<Region>> {
        {
            let regions = err_at!(Fatal, self.regions.read())?;
            if let Some(Some(region)) = regions.get(index) {
                return Ok(Arc::clone(region));
            }
        }

        let mut regions = err_at!(Fatal, self.regions.write())?;
        if regions.len() <= index {
            regions.resize_with(index + 1, || None);
        }
        if let Some(region) = &regions[index] {
            return Ok(Arc::clone(region));
        }

        let offset = (index as u64) * self.region_size;
        let mmap = unsafe {
            let mut opts = MmapOptions::new();
            opts.offset(offset).len(self.region_size as usize);
            err_at!(IOError, opts.map(&self.file), "mapping region {}", index)?
        };
        let region = Arc::new(Region { mmap });
        regions[index] = Some(Arc::clone(&region));
        Ok(region)
    }
}

/// Immutable byte view into the store. Mapped views keep their region
/// alive and stay valid for the life of the database handle.
pub enum View {
    Mapped {
        region: Arc<Region>,
        off: usize,
        len: usize,
    },
    Owned {
        data: Vec<u8>,
    },
}

impl ops::Deref for View {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            View::Mapped { region, off, len } => &region.as_slice()[*off..*off + *len],
            View::Owned { data } => data,
        }
    }
}

impl AsRef<[u8]> for View {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

#[cfg(test)]
#[path = "region_test.rs"]
mod region_test;
