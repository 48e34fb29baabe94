use super::*;

use crate::Error;

#[test]
fn test_alloc_align() {
    let mut alloc = Allocator::new(768, 4096);

    let addr = alloc.alloc(10, 1).unwrap();
    assert_eq!(addr, 768);
    assert_eq!(alloc.to_hwm(), 778);

    let addr = alloc.alloc(8, 8).unwrap();
    assert_eq!(addr, 784);
    assert_eq!(alloc.to_hwm(), 792);

    let addr = alloc.alloc(1, 512).unwrap();
    assert_eq!(addr, 1024);

    // bad alignments.
    assert!(matches!(alloc.alloc(1, 0), Err(Error::AlignmentOverflow(_, _))));
    assert!(matches!(alloc.alloc(1, 3), Err(Error::AlignmentOverflow(_, _))));
    assert!(matches!(alloc.alloc(1, 8192), Err(Error::AlignmentOverflow(_, _))));
    // zero-sized and over-sized requests.
    assert!(matches!(alloc.alloc(0, 1), Err(Error::InvalidInput(_, _))));
    assert!(matches!(alloc.alloc(4097, 1), Err(Error::OutOfSpace(_, _))));
}

#[test]
fn test_alloc_region_boundary() {
    let mut alloc = Allocator::new(768, 4096);

    let addr = alloc.alloc(3000, 1).unwrap();
    assert_eq!(addr, 768);
    // would straddle the first boundary, padded to the next region.
    let addr = alloc.alloc(1000, 1).unwrap();
    assert_eq!(addr, 4096);
    assert_eq!(alloc.to_hwm(), 5096);
    // fits in the tail of the second region.
    let addr = alloc.alloc(3000, 8).unwrap();
    assert_eq!(addr, 5096);
}

#[test]
fn test_alloc_scratch() {
    let mut alloc = Allocator::new(768, 4096);

    let addr = alloc.alloc(12, 1).unwrap();
    alloc.as_mut(addr, 12).copy_from_slice(b"hello world\n");
    assert_eq!(alloc.scratch(addr, 12).unwrap(), b"hello world\n");
    assert_eq!(alloc.scratch(addr + 6, 6).unwrap(), b"world\n");

    // outside the reservation.
    assert!(alloc.scratch(760, 4).is_none());
    assert!(alloc.scratch(addr, 16).is_none());

    alloc.write(addr, b"HELLO");
    assert_eq!(alloc.scratch(addr, 12).unwrap(), b"HELLO world\n");
    assert_eq!(&alloc.as_buf()[..12], b"HELLO world\n");
}

#[test]
fn test_alloc_reset() {
    let mut alloc = Allocator::new(768, 4096);

    alloc.alloc(1024, 1).unwrap();
    assert_eq!(alloc.to_hwm(), 1792);
    alloc.reset();
    assert_eq!(alloc.to_hwm(), 768);
    assert_eq!(alloc.as_buf().len(), 0);

    // addresses are re-issued after a reset.
    let addr = alloc.alloc(16, 1).unwrap();
    assert_eq!(addr, 768);
}
