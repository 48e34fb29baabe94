use super::*;

use crate::Error;

#[test]
fn test_header_roundtrip() {
    let header = Header::new();
    assert_eq!(header.version, VERSION);
    assert_eq!(header.latest_trailer, HEADER_SIZE);

    let buf = header.encode();
    assert_eq!(buf.len(), HEADER_SIZE as usize);
    assert_eq!(&buf[..8], &MAGIC);

    let decoded = Header::decode(&buf).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_header_corrupt() {
    let header = Header::new();
    let buf = header.encode();

    // short buffer.
    assert!(matches!(
        Header::decode(&buf[..100]),
        Err(Error::InvalidFile(_, _))
    ));
    // magic tampered.
    let mut copy = buf.clone();
    copy[0] = b'q';
    assert!(matches!(Header::decode(&copy), Err(Error::BadMagic(_, _))));
    // major version bumped.
    let mut copy = buf.clone();
    copy[8] = 99;
    assert!(matches!(Header::decode(&copy), Err(Error::BadVersion(_, _))));
}

#[test]
fn test_trailer_roundtrip() {
    let trailer = Trailer {
        revision: 42,
        prev_trailer: 0x1000,
        file_size: 0x2000,
        time_ms: 1_600_000_000_000,
        index_roots: [1 << 10, 0, 3 << 20, 0, 5 << 30, 7],
    };

    let buf = trailer.encode();
    assert_eq!(buf.len(), TRAILER_SIZE as usize);
    assert_eq!(&buf[..8], &TRAILER_MAGIC_BEGIN);
    assert_eq!(&buf[504..], &TRAILER_MAGIC_END);

    let decoded = Trailer::decode(&buf).unwrap();
    assert_eq!(decoded, trailer);

    // trailing bytes beyond the record are ignored.
    let mut long = buf.clone();
    long.extend_from_slice(&[0xff; 64]);
    assert_eq!(Trailer::decode(&long).unwrap(), trailer);
}

#[test]
fn test_trailer_genesis() {
    let trailer = Trailer::genesis(12345);
    assert_eq!(trailer.revision, 0);
    assert_eq!(trailer.prev_trailer, 0);
    assert_eq!(trailer.file_size, HEADER_SIZE + TRAILER_SIZE);
    assert_eq!(trailer.index_roots, [0; IndexKind::COUNT]);

    let decoded = Trailer::decode(&trailer.encode()).unwrap();
    assert_eq!(decoded, trailer);
}

#[test]
fn test_trailer_corrupt() {
    let trailer = Trailer::genesis(12345);
    let buf = trailer.encode();

    assert!(matches!(
        Trailer::decode(&buf[..500]),
        Err(Error::InvalidFile(_, _))
    ));

    let mut copy = buf.clone();
    copy[0] = b'q';
    assert!(matches!(Trailer::decode(&copy), Err(Error::BadMagic(_, _))));

    let mut copy = buf.clone();
    copy[510] = b'q';
    assert!(matches!(Trailer::decode(&copy), Err(Error::BadMagic(_, _))));

    // every single-bit flip in the body must be caught by the checksum.
    for off in vec![8, 24, 40, 100, 400] {
        let mut copy = buf.clone();
        copy[off] ^= 0x40;
        assert!(
            matches!(Trailer::decode(&copy), Err(Error::BadChecksum(_, _))),
            "offset {}",
            off
        );
    }
}
