use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::fs;

use super::*;

use crate::{util, Error};

fn setup(name: &str, len: usize) -> (fs::File, Vec<u8>) {
    let seed: u128 = random();
    println!("setup {} {}", name, seed);
    let mut seed_bytes = [0u8; 32];
    seed_bytes[..16].copy_from_slice(&seed.to_le_bytes());
    let mut rng = SmallRng::from_seed(seed_bytes);

    let dir = std::env::temp_dir().join(name);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("db.data");
    fs::remove_file(&file).ok();

    let mut fd = util::create_file_rw(file.as_os_str()).unwrap();
    let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    util::write_at(&mut fd, 0, &data).unwrap();
    fd.sync_all().unwrap();
    (fd, data)
}

#[test]
fn test_region_views() {
    let region_size = 4096_u64;
    let (fd, data) = setup("pstore-test-region-views", 10240);
    let regions = RegionMap::new(fd, region_size);

    assert_eq!(regions.file_len().unwrap(), 10240);

    // within the first region.
    let view = regions.view(100, 500, 10240).unwrap();
    assert_eq!(&view[..], &data[100..600]);
    // exactly a full region.
    let view = regions.view(4096, 4096, 10240).unwrap();
    assert_eq!(&view[..], &data[4096..8192]);
    // last bytes of the file, inside the third region.
    let view = regions.view(10200, 40, 10240).unwrap();
    assert_eq!(&view[..], &data[10200..]);

    // beyond the visibility limit.
    match regions.view(100, 500, 400) {
        Err(Error::AddressOutOfRange(_, _)) => (),
        other => panic!("{:?}", other.map(|v| v.len())),
    }
    // straddling a region boundary.
    match regions.view(4000, 200, 10240) {
        Err(Error::AddressOutOfRange(_, _)) => (),
        other => panic!("{:?}", other.map(|v| v.len())),
    }

    // open-ended view runs to the region end.
    let view = regions.view_from(4100, 10240).unwrap();
    assert_eq!(view.len(), 8192 - 4100);
    assert_eq!(&view[..], &data[4100..8192]);
    // or to the limit, when the limit comes first.
    let view = regions.view_from(8200, 10240).unwrap();
    assert_eq!(view.len(), 10240 - 8200);
}

#[test]
fn test_region_growth() {
    let region_size = 4096_u64;
    let (fd, data) = setup("pstore-test-region-growth", 4000);
    let wfd = fd.try_clone().unwrap();
    let regions = RegionMap::new(fd, region_size);

    // a view taken before growth ...
    let early = regions.view(0, 4000, 4000).unwrap();

    regions.grow(9000).unwrap();
    assert_eq!(regions.file_len().unwrap(), 9000);

    let tail: Vec<u8> = (0..5000).map(|i| (i % 251) as u8).collect();
    let mut wfd = wfd;
    util::write_at(&mut wfd, 4000, &tail).unwrap();
    wfd.sync_all().unwrap();

    // ... stays valid and unchanged after the file grows.
    assert_eq!(&early[..], &data[..]);

    // bytes written after growth are visible, across the boundary pages.
    let view = regions.view(4096, 4000, 9000).unwrap();
    assert_eq!(&view[..], &tail[96..4096]);
}

#[test]
fn test_view_owned() {
    let view = View::Owned { data: vec![1, 2, 3] };
    assert_eq!(&view[..], &[1, 2, 3]);
    assert_eq!(view.as_ref(), &[1, 2, 3]);
}
