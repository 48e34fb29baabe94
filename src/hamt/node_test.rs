use super::*;

use crate::hamt::Digest;
use crate::store::Ext;

#[test]
fn test_leaf_roundtrip() {
    let entries: Vec<(Vec<u8>, u64)> = vec![
        (b"hello".to_vec(), 0x1000),
        (b"world".to_vec(), 0x2008),
        (vec![], 0x3010),
    ];
    let node = Node::Leaf { entries: entries.clone() };

    let mut buf = vec![];
    node.encode(&mut buf).unwrap();
    assert_eq!(buf[0], 1); // leaf tag
    assert_eq!(buf[1], 3);

    match Node::<Vec<u8>, u64>::decode(&buf).unwrap() {
        Node::Leaf { entries: decoded } => assert_eq!(decoded, entries),
        Node::Internal { .. } => panic!("expected leaf"),
    }
}

#[test]
fn test_leaf_roundtrip_digest() {
    let entries: Vec<(Digest, Ext)> = vec![
        (Digest(0), Ext::new(0x100, 10)),
        (Digest(u128::MAX), Ext::new(0x200, 20)),
        (Digest(0xdead_beef), Ext::new(0x300, 30)),
    ];
    let node = Node::Leaf { entries: entries.clone() };

    let mut buf = vec![];
    node.encode(&mut buf).unwrap();

    match Node::<Digest, Ext>::decode(&buf).unwrap() {
        Node::Leaf { entries: decoded } => assert_eq!(decoded, entries),
        Node::Internal { .. } => panic!("expected leaf"),
    }
}

#[test]
fn test_internal_roundtrip() {
    let bitmap: u64 = (1 << 3) | (1 << 17) | (1 << 63);
    let words = vec![leaf_to_word(0x1000), 0x2008, leaf_to_word(0x3010)];
    let node: Node<Vec<u8>, u64> = Node::Internal {
        bitmap,
        children: words.iter().map(|w| Child::Disk(*w)).collect(),
    };

    let mut buf = vec![];
    node.encode(&mut buf).unwrap();
    assert_eq!(buf[0], 0); // internal tag
    assert_eq!(buf.len(), 1 + 8 + (3 * 8));

    match Node::<Vec<u8>, u64>::decode(&buf).unwrap() {
        Node::Internal { bitmap: b, children } => {
            assert_eq!(b, bitmap);
            let decoded: Vec<u64> = children
                .iter()
                .map(|c| match c {
                    Child::Disk(word) => *word,
                    Child::Mem(_) => panic!("expected disk child"),
                })
                .collect();
            assert_eq!(decoded, words);
        }
        Node::Leaf { .. } => panic!("expected internal"),
    }
}

#[test]
fn test_tagged_words() {
    assert_eq!(word_to_addr(leaf_to_word(0x1000)), 0x1000);
    assert_eq!(leaf_to_word(0x1000) & 1, 1);
    assert_eq!(word_to_addr(0x2008), 0x2008);
    assert_eq!(0x2008_u64 & 1, 0);
}

#[test]
fn test_decode_corrupt() {
    // empty buffer.
    assert!(Node::<Vec<u8>, u64>::decode(&[]).is_err());
    // unknown tag.
    assert!(Node::<Vec<u8>, u64>::decode(&[7, 0, 0]).is_err());
    // internal with empty bitmap.
    let mut buf = vec![0_u8];
    buf.extend_from_slice(&0_u64.to_le_bytes());
    assert!(Node::<Vec<u8>, u64>::decode(&buf).is_err());
    // internal truncated before its children.
    let mut buf = vec![0_u8];
    buf.extend_from_slice(&3_u64.to_le_bytes());
    assert!(Node::<Vec<u8>, u64>::decode(&buf).is_err());
    // leaf truncated mid-entry.
    let entries: Vec<(Vec<u8>, u64)> = vec![(b"key".to_vec(), 42)];
    let node = Node::Leaf { entries };
    let mut buf = vec![];
    node.encode(&mut buf).unwrap();
    assert!(Node::<Vec<u8>, u64>::decode(&buf[..buf.len() - 1]).is_err());
}

#[test]
fn test_encode_mem_child() {
    let leaf: Node<Vec<u8>, u64> = Node::Leaf { entries: vec![] };
    let node: Node<Vec<u8>, u64> = Node::Internal {
        bitmap: 1,
        children: vec![Child::Mem(Box::new(leaf))],
    };
    let mut buf = vec![];
    assert!(node.encode(&mut buf).is_err());
}
