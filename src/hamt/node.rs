//! Trie node representation and its on-disk serialisation.
//!
//! Within a transaction a child is either a store address of a committed
//! node or an in-memory node carrying uncommitted modifications. On disk
//! a child slot is a tagged word: low bit set means the remaining 63 bits
//! address a leaf node, low bit clear means the word addresses an
//! internal node. The tag survives re-encoding of a copied parent whose
//! child was left untouched.

use std::convert::TryFrom;

use crate::{
    hamt::{Key, Value},
    Result,
};

const TAG_INTERNAL: u8 = 0;
const TAG_LEAF: u8 = 1;

/// Store address held in a tagged child word.
pub(crate) fn word_to_addr(word: u64) -> u64 {
    if word & 1 == 1 {
        word >> 1
    } else {
        word
    }
}

pub(crate) fn leaf_to_word(addr: u64) -> u64 {
    (addr << 1) | 1
}

pub(crate) enum Child<K, V> {
    Disk(u64), // tagged word
    Mem(Box<Node<K, V>>),
}

pub(crate) enum Node<K, V> {
    Internal { bitmap: u64, children: Vec<Child<K, V>> },
    Leaf { entries: Vec<(K, V)> },
}

impl<K, V> Node<K, V>
where
    K: Key,
    V: Value,
{
    pub fn is_leaf(&self) -> bool {
        match self {
            Node::Internal { .. } => false,
            Node::Leaf { .. } => true,
        }
    }

    /// Serialise this node. Every child must already refer to a store
    /// address, flush order is bottom-up.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Node::Internal { bitmap, children } => {
                if children.len() != (bitmap.count_ones() as usize) {
                    return err_at!(
                        Fatal, msg: "bitmap {:x} vs children {}", bitmap, children.len()
                    );
                }
                buf.push(TAG_INTERNAL);
                buf.extend_from_slice(&bitmap.to_le_bytes());
                for child in children.iter() {
                    match child {
                        Child::Disk(word) => buf.extend_from_slice(&word.to_le_bytes()),
                        Child::Mem(_) => {
                            return err_at!(Fatal, msg: "encoding an unflushed child")
                        }
                    }
                }
                Ok(())
            }
            Node::Leaf { entries } => {
                let count = match u8::try_from(entries.len()) {
                    Ok(count) => count,
                    Err(_) => {
                        return err_at!(
                            OutOfSpace, msg: "collision leaf overflow {}", entries.len()
                        )
                    }
                };
                buf.push(TAG_LEAF);
                buf.push(count);
                for (key, value) in entries.iter() {
                    key.encode(buf);
                    value.encode(buf);
                }
                Ok(())
            }
        }
    }

    /// Decode a node from the front of `buf`, typically a view opening at
    /// the node's store address.
    pub fn decode(buf: &[u8]) -> Result<Node<K, V>> {
        match buf.first() {
            Some(&TAG_INTERNAL) => {
                if buf.len() < 9 {
                    return err_at!(CorruptNode, msg: "internal truncated {}", buf.len());
                }
                let mut bytes = [0_u8; 8];
                bytes.copy_from_slice(&buf[1..9]);
                let bitmap = u64::from_le_bytes(bytes);
                if bitmap == 0 {
                    return err_at!(CorruptNode, msg: "internal with empty bitmap");
                }
                let count = bitmap.count_ones() as usize;
                if buf.len() < 9 + (count * 8) {
                    return err_at!(
                        CorruptNode, msg: "internal truncated {}/{}", buf.len(), 9 + count * 8
                    );
                }
                let mut children = Vec::with_capacity(count);
                for i in 0..count {
                    let off = 9 + (i * 8);
                    bytes.copy_from_slice(&buf[off..off + 8]);
                    let word = u64::from_le_bytes(bytes);
                    if word_to_addr(word) == 0 {
                        return err_at!(CorruptNode, msg: "null child in slot {}", i);
                    }
                    children.push(Child::Disk(word));
                }
                Ok(Node::Internal { bitmap, children })
            }
            Some(&TAG_LEAF) => {
                if buf.len() < 2 {
                    return err_at!(CorruptNode, msg: "leaf truncated");
                }
                let count = buf[1] as usize;
                let mut entries = Vec::with_capacity(count);
                let mut off = 2;
                for _i in 0..count {
                    let (key, n) = K::decode(&buf[off..])?;
                    off += n;
                    let (value, n) = V::decode(&buf[off..])?;
                    off += n;
                    entries.push((key, value));
                }
                Ok(Node::Leaf { entries })
            }
            Some(&tag) => err_at!(CorruptNode, msg: "unknown node tag {}", tag),
            None => err_at!(CorruptNode, msg: "empty node"),
        }
    }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
