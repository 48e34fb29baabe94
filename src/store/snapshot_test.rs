use std::{ffi, fs};

use super::*;

use crate::{
    store::{lock, str_to_revision, AccessMode, Config, Revision},
    Store,
};

fn db_loc(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join(name);
    fs::create_dir_all(&dir).unwrap();
    let db = dir.join("t.db");
    fs::remove_file(&db).ok();
    fs::remove_file(lock::lock_location(db.as_os_str())).ok();
    db.into_os_string()
}

#[test]
fn test_snapshot_sorted_names() {
    let loc = db_loc("pstore-test-sorted-names");
    let db = Store::create(&loc, Config::new()).unwrap();

    let names = vec!["zebra", "apple", "mango", "cherry", "banana"];
    {
        let mut tx = db.begin().unwrap();
        for name in names.iter() {
            tx.intern(IndexKind::Names, name).unwrap();
        }
        tx.commit().unwrap();
    }

    let snap = db.snapshot(Revision::Head).unwrap();
    let sorted = snap.names().to_sorted().unwrap();
    let keys: Vec<&str> = sorted.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["apple", "banana", "cherry", "mango", "zebra"]);

    // every binding resolves back to its own bytes.
    for (key, addr) in sorted.iter() {
        assert_eq!(snap.read_interned(*addr).unwrap(), key.as_bytes().to_vec());
    }
}

#[test]
fn test_snapshot_strings_independent() {
    let loc = db_loc("pstore-test-strings-index");
    let db = Store::create(&loc, Config::new()).unwrap();

    {
        let mut tx = db.begin().unwrap();
        tx.intern(IndexKind::Names, "shared").unwrap();
        tx.intern(IndexKind::Strings, "only-strings").unwrap();
        tx.commit().unwrap();
    }

    let snap = db.snapshot(Revision::Head).unwrap();
    // names and strings are independent intern tables.
    assert!(snap.names().get(&"shared".to_string()).unwrap().is_some());
    assert_eq!(snap.names().get(&"only-strings".to_string()).unwrap(), None);
    assert!(snap.strings().get(&"only-strings".to_string()).unwrap().is_some());
    assert_eq!(snap.strings().get(&"shared".to_string()).unwrap(), None);

    let addr = snap.strings().get(&"only-strings".to_string()).unwrap().unwrap();
    assert_eq!(snap.read_interned(addr).unwrap(), b"only-strings".to_vec());
}

#[test]
fn test_snapshot_revision_walk() {
    let loc = db_loc("pstore-test-revision-walk");
    let db = Store::create(&loc, Config::new()).unwrap();

    for i in 0..10_u64 {
        let mut tx = db.begin().unwrap();
        tx.intern(IndexKind::Names, &format!("name-{}", i)).unwrap();
        tx.commit().unwrap();
    }

    // every intermediate revision is reachable and self-consistent.
    for n in 0..=10_u64 {
        let snap = db.snapshot(Revision::Number(n)).unwrap();
        assert_eq!(snap.to_revision(), n);
        assert_eq!(snap.names().to_vec().unwrap().len(), n as usize);
        if n > 0 {
            let key = format!("name-{}", n - 1);
            assert!(snap.names().get(&key).unwrap().is_some());
        }
    }

    // times are monotone non-decreasing along the chain.
    let mut last = 0;
    for n in 0..=10_u64 {
        let snap = db.snapshot(Revision::Number(n)).unwrap();
        assert!(snap.to_time_ms() >= last);
        last = snap.to_time_ms();
    }
}

#[test]
fn test_snapshot_iter() {
    let loc = db_loc("pstore-test-snapshot-iter");
    let db = Store::create(&loc, Config::new()).unwrap();

    {
        let mut tx = db.begin().unwrap();
        for i in 0..100_u64 {
            let (buf, addr) = tx.alloc_rw(8, 8).unwrap();
            buf.copy_from_slice(&i.to_le_bytes());
            tx.writes()
                .insert(format!("key-{:03}", i).into_bytes(), Ext::new(addr, 8))
                .unwrap();
        }
        tx.commit().unwrap();
    }
    std::mem::drop(db);

    let db = Store::open(&loc, AccessMode::ReadOnly).unwrap();
    let snap = db.snapshot(Revision::Head).unwrap();

    let mut count = 0;
    for entry in snap.writes().iter().unwrap() {
        let (key, ext) = entry.unwrap();
        let view = snap.read(&ext).unwrap();
        let n = {
            let mut bytes = [0_u8; 8];
            bytes.copy_from_slice(&view);
            u64::from_le_bytes(bytes)
        };
        assert_eq!(format!("key-{:03}", n).into_bytes(), key);
        count += 1;
    }
    assert_eq!(count, 100);
}

#[test]
fn test_str_to_revision() {
    assert_eq!(str_to_revision("HEAD"), Some(Revision::Head));
    assert_eq!(str_to_revision("head"), Some(Revision::Head));
    assert_eq!(str_to_revision("  Head "), Some(Revision::Head));
    assert_eq!(str_to_revision("0"), Some(Revision::Number(0)));
    assert_eq!(str_to_revision(" 42\t"), Some(Revision::Number(42)));
    assert_eq!(str_to_revision(""), None);
    assert_eq!(str_to_revision("-1"), None);
    assert_eq!(str_to_revision("4x2"), None);
}
