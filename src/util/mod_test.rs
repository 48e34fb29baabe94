use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;

#[test]
fn test_varint() {
    let seed: u128 = random();
    println!("test_varint {}", seed);
    let mut seed_bytes = [0u8; 32];
    seed_bytes[..16].copy_from_slice(&seed.to_le_bytes());
    let mut rng = SmallRng::from_seed(seed_bytes);

    for n in vec![0, 1, 127, 128, 300, 16_383, 16_384, u64::MAX] {
        let mut buf = vec![];
        encode_varint(n, &mut buf);
        let (val, m) = decode_varint(&buf).unwrap();
        assert_eq!(val, n);
        assert_eq!(m, buf.len());
    }

    for _i in 0..1000 {
        let n: u64 = rng.gen();
        let mut buf = vec![];
        encode_varint(n, &mut buf);
        assert!(buf.len() <= 10);
        let (val, m) = decode_varint(&buf).unwrap();
        assert_eq!(val, n);
        assert_eq!(m, buf.len());
    }

    // trailing bytes are left alone.
    let mut buf = vec![];
    encode_varint(300, &mut buf);
    let n = buf.len();
    buf.extend_from_slice(&[0xde, 0xad]);
    let (val, m) = decode_varint(&buf).unwrap();
    assert_eq!(val, 300);
    assert_eq!(m, n);

    // truncated stream.
    assert!(decode_varint(&[]).is_err());
    assert!(decode_varint(&[0x80]).is_err());
    // more than 10 bytes of continuation.
    assert!(decode_varint(&[0x80; 11]).is_err());
}

#[test]
fn test_write_at() {
    let dir = std::env::temp_dir().join("pstore-test-write-at");
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("write-at.data");
    std::fs::remove_file(&file).ok();

    let mut fd = create_file_rw(file.as_os_str()).unwrap();
    write_at(&mut fd, 0, &[1; 16]).unwrap();
    write_at(&mut fd, 8, &[2; 8]).unwrap();
    fd.sync_all().unwrap();

    let data = std::fs::read(&file).unwrap();
    assert_eq!(&data[..8], &[1; 8]);
    assert_eq!(&data[8..], &[2; 8]);
}
