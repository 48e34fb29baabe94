//! Copy-on-write trie map over a [Source] of committed bytes.

use crate::{
    hamt::{
        self, hash_slice,
        node::{leaf_to_word, word_to_addr},
        Child, Key, Node, Source, Value,
    },
    store::alloc::Allocator,
    Result,
};

/// Persistent hash-trie map, one per index kind per transaction.
///
/// A map starts out rooted at a committed node address, or empty.
/// Mutations copy the nodes along the touched path into memory and leave
/// every other sub-tree referenced by its store address. [Map::flush]
/// writes the in-memory nodes back to the store bottom-up and returns the
/// new root word for the trailer.
pub struct Map<K, V> {
    root: Option<Child<K, V>>,
}

impl<K, V> Map<K, V>
where
    K: Key,
    V: Value,
{
    pub fn new() -> Map<K, V> {
        Map { root: None }
    }

    /// Root a map at a trailer's root word, 0 means an empty index.
    pub(crate) fn from_root(word: u64) -> Map<K, V> {
        let root = match word {
            0 => None,
            word => Some(Child::Disk(word)),
        };
        Map { root }
    }

    pub fn get<S>(&self, src: &S, key: &K) -> Result<Option<V>>
    where
        S: Source,
    {
        match &self.root {
            None => Ok(None),
            Some(child) => get_child(src, child, key, key.to_hash(), 0),
        }
    }

    /// Insert a new binding. An existing binding is left alone and
    /// returned.
    pub fn insert<S>(&mut self, src: &S, key: K, value: V) -> Result<Option<V>>
    where
        S: Source,
    {
        self.set(src, key, value, false /*assign*/)
    }

    /// Insert a new binding, replacing and returning an existing one.
    pub fn insert_or_assign<S>(&mut self, src: &S, key: K, value: V) -> Result<Option<V>>
    where
        S: Source,
    {
        self.set(src, key, value, true /*assign*/)
    }

    fn set<S>(&mut self, src: &S, key: K, value: V, assign: bool) -> Result<Option<V>>
    where
        S: Source,
    {
        let old = self.get(src, &key)?;
        if old.is_some() && !assign {
            return Ok(old);
        }

        let hash = key.to_hash();
        let mut root = match self.root.take() {
            None => Box::new(Node::Leaf { entries: vec![] }),
            Some(child) => into_mem(src, child)?,
        };
        insert_node(src, &mut root, key, value, hash, 0)?;
        self.root = Some(Child::Mem(root));

        Ok(old)
    }

    /// Write every in-memory node to the store, bottom-up. Return the
    /// root word to be recorded in the trailer, 0 for an empty index.
    /// A child already referring to a store address is never re-written.
    pub(crate) fn flush(&mut self, alloc: &mut Allocator) -> Result<u64> {
        match self.root.take() {
            None => Ok(0),
            Some(Child::Disk(word)) => {
                self.root = Some(Child::Disk(word));
                Ok(word)
            }
            Some(Child::Mem(mut node)) => {
                let word = flush_node(&mut node, alloc)?;
                self.root = Some(Child::Disk(word));
                Ok(word)
            }
        }
    }
}

fn get_child<S, K, V>(
    src: &S,
    child: &Child<K, V>,
    key: &K,
    hash: u64,
    depth: usize,
) -> Result<Option<V>>
where
    S: Source,
    K: Key,
    V: Value,
{
    match child {
        Child::Mem(node) => get_node(src, node, key, hash, depth),
        Child::Disk(word) => {
            let node = load_node(src, *word)?;
            get_node(src, &node, key, hash, depth)
        }
    }
}

fn get_node<S, K, V>(
    src: &S,
    node: &Node<K, V>,
    key: &K,
    hash: u64,
    depth: usize,
) -> Result<Option<V>>
where
    S: Source,
    K: Key,
    V: Value,
{
    match node {
        Node::Leaf { entries } => {
            let value = entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
            Ok(value)
        }
        Node::Internal { bitmap, children } => {
            let bit = 1_u64 << hash_slice(hash, depth);
            if bitmap & bit == 0 {
                Ok(None)
            } else {
                let idx = (bitmap & (bit - 1)).count_ones() as usize;
                get_child(src, &children[idx], key, hash, depth + 1)
            }
        }
    }
}

// Copy-on-write descent. The caller has resolved `insert` semantics, an
// existing binding for `key` is always replaced here.
fn insert_node<S, K, V>(
    src: &S,
    node: &mut Node<K, V>,
    key: K,
    value: V,
    hash: u64,
    depth: usize,
) -> Result<()>
where
    S: Source,
    K: Key,
    V: Value,
{
    match node {
        Node::Leaf { entries } => {
            for entry in entries.iter_mut() {
                if entry.0 == key {
                    entry.1 = value;
                    return Ok(());
                }
            }
            if entries.len() < hamt::LEAF_CAP || depth >= hamt::MAX_DEPTH {
                entries.push((key, value));
                return Ok(());
            }
            // Split, re-distributing the entries one level down.
            let mut split = Node::Internal { bitmap: 0, children: vec![] };
            for (k, v) in entries.drain(..) {
                let h = k.to_hash();
                insert_node(src, &mut split, k, v, h, depth)?;
            }
            insert_node(src, &mut split, key, value, hash, depth)?;
            *node = split;
            Ok(())
        }
        Node::Internal { bitmap, children } => {
            let bit = 1_u64 << hash_slice(hash, depth);
            let idx = (*bitmap & (bit - 1)).count_ones() as usize;
            if *bitmap & bit == 0 {
                let leaf = Node::Leaf { entries: vec![(key, value)] };
                children.insert(idx, Child::Mem(Box::new(leaf)));
                *bitmap |= bit;
                return Ok(());
            }
            ensure_mem(src, &mut children[idx])?;
            match &mut children[idx] {
                Child::Mem(child) => insert_node(src, child, key, value, hash, depth + 1),
                Child::Disk(_) => err_at!(Fatal, msg: "child still on disk"),
            }
        }
    }
}

fn ensure_mem<S, K, V>(src: &S, child: &mut Child<K, V>) -> Result<()>
where
    S: Source,
    K: Key,
    V: Value,
{
    if let Child::Disk(word) = child {
        let node = load_node(src, *word)?;
        *child = Child::Mem(Box::new(node));
    }
    Ok(())
}

fn into_mem<S, K, V>(src: &S, child: Child<K, V>) -> Result<Box<Node<K, V>>>
where
    S: Source,
    K: Key,
    V: Value,
{
    match child {
        Child::Mem(node) => Ok(node),
        Child::Disk(word) => Ok(Box::new(load_node(src, word)?)),
    }
}

fn load_node<S, K, V>(src: &S, word: u64) -> Result<Node<K, V>>
where
    S: Source,
    K: Key,
    V: Value,
{
    let view = src.view_from(word_to_addr(word))?;
    Node::decode(&view)
}

fn flush_node<K, V>(node: &mut Node<K, V>, alloc: &mut Allocator) -> Result<u64>
where
    K: Key,
    V: Value,
{
    if let Node::Internal { children, .. } = node {
        for child in children.iter_mut() {
            if let Child::Mem(sub) = child {
                let word = flush_node(sub, alloc)?;
                *child = Child::Disk(word);
            }
        }
    }

    let mut buf = vec![];
    node.encode(&mut buf)?;
    let addr = alloc.alloc(buf.len() as u64, 8)?;
    alloc.write(addr, &buf);

    match node.is_leaf() {
        true => Ok(leaf_to_word(addr)),
        false => Ok(addr),
    }
}

/// Iterator over a committed index root. Entries come out in an order
/// determined by their hash, stable across runs for the same key set.
pub struct Iter<S, K, V> {
    src: S,
    stack: Vec<Frame<K, V>>,
}

struct Frame<K, V> {
    node: Node<K, V>,
    off: usize,
}

enum Step<K, V> {
    Entry((K, V)),
    Descend(u64),
    Pop,
}

impl<S, K, V> Iter<S, K, V>
where
    S: Source,
    K: Key,
    V: Value,
{
    pub(crate) fn new(src: S, word: u64) -> Result<Iter<S, K, V>> {
        let stack = match word {
            0 => vec![],
            word => vec![Frame { node: load_node(&src, word)?, off: 0 }],
        };
        Ok(Iter { src, stack })
    }
}

impl<S, K, V> Iterator for Iter<S, K, V>
where
    S: Source,
    K: Key,
    V: Value,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = {
                let frame = self.stack.last_mut()?;
                let off = frame.off;
                match &frame.node {
                    Node::Leaf { entries } if off < entries.len() => {
                        frame.off += 1;
                        Step::Entry(entries[off].clone())
                    }
                    Node::Internal { children, .. } if off < children.len() => {
                        frame.off += 1;
                        match &children[off] {
                            Child::Disk(word) => Step::Descend(*word),
                            Child::Mem(_) => {
                                return Some(err_at!(Fatal, msg: "iterating unflushed index"))
                            }
                        }
                    }
                    _ => Step::Pop,
                }
            };
            match step {
                Step::Entry(entry) => return Some(Ok(entry)),
                Step::Descend(word) => match load_node(&self.src, word) {
                    Ok(node) => self.stack.push(Frame { node, off: 0 }),
                    Err(err) => return Some(Err(err)),
                },
                Step::Pop => {
                    self.stack.pop();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "map_test.rs"]
mod map_test;
