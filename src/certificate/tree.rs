//! Merkle hash trees carried inside certificates.
//!
//! A tree is a recursive enum so every node kind is handled exhaustively.
//! Only the root hash is signed; [`HashTree::digest`] re-derives it bottom-up
//! with a domain-separated SHA-256 per node kind.

use crate::certificate::cbor;
use ciborium::value::Value;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

const EMPTY_TAG: u64 = 0;
const FORK_TAG: u64 = 1;
const LABELED_TAG: u64 = 2;
const LEAF_TAG: u64 = 3;
const PRUNED_TAG: u64 = 4;

/// Maximum nesting accepted when decoding, guarding the recursive decoder.
const MAX_TREE_DEPTH: usize = 128;

#[derive(Clone, PartialEq, Eq)]
pub enum HashTree {
    Empty,
    Fork(Box<HashTree>, Box<HashTree>),
    Labeled(Vec<u8>, Box<HashTree>),
    Leaf(Vec<u8>),
    /// Hash-only placeholder; never traversed.
    Pruned([u8; 32]),
}

/// Outcome of looking a path up in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult<'a> {
    /// The path resolves to this leaf value.
    Found(&'a [u8]),
    /// The tree proves the path does not exist.
    Absent,
    /// A pruned subtree hides the answer.
    Unknown,
    /// The path runs into a node of the wrong kind.
    Error,
}

/// Result of searching one level of labeled children.
enum LabelSearch<'a> {
    Found(&'a HashTree),
    Absent,
    Unknown,
    /// The label sorts before everything in the searched subtree.
    Less,
    /// The label sorts after everything in the searched subtree.
    Greater,
    Error,
}

fn domain_sep(name: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(name.len() + 1);
    prefix.push(name.len() as u8);
    prefix.extend_from_slice(name.as_bytes());
    prefix
}

impl HashTree {
    pub fn fork(left: HashTree, right: HashTree) -> Self {
        HashTree::Fork(Box::new(left), Box::new(right))
    }

    pub fn labeled(label: impl Into<Vec<u8>>, subtree: HashTree) -> Self {
        HashTree::Labeled(label.into(), Box::new(subtree))
    }

    pub fn leaf(value: impl Into<Vec<u8>>) -> Self {
        HashTree::Leaf(value.into())
    }

    /// Replace this subtree by its hash.
    pub fn pruned(&self) -> Self {
        HashTree::Pruned(self.digest())
    }

    /// Root hash of the (sub)tree.
    pub fn digest(&self) -> [u8; 32] {
        match self {
            HashTree::Empty => Sha256::digest(domain_sep("ic-hashtree-empty")).into(),
            HashTree::Fork(left, right) => {
                let mut hasher = Sha256::new();
                hasher.update(domain_sep("ic-hashtree-fork"));
                hasher.update(left.digest());
                hasher.update(right.digest());
                hasher.finalize().into()
            }
            HashTree::Labeled(label, subtree) => {
                let mut hasher = Sha256::new();
                hasher.update(domain_sep("ic-hashtree-labeled"));
                hasher.update(label);
                hasher.update(subtree.digest());
                hasher.finalize().into()
            }
            HashTree::Leaf(value) => {
                let mut hasher = Sha256::new();
                hasher.update(domain_sep("ic-hashtree-leaf"));
                hasher.update(value);
                hasher.finalize().into()
            }
            HashTree::Pruned(hash) => *hash,
        }
    }

    /// Resolve `path` label by label.
    ///
    /// Labels within a level are sorted, so a label falling between two
    /// adjacent known labels is provably absent, while one that could sit
    /// inside a pruned subtree is unknown.
    pub fn lookup_path<L: AsRef<[u8]>>(&self, path: &[L]) -> LookupResult<'_> {
        let Some((label, rest)) = path.split_first() else {
            return match self {
                HashTree::Leaf(value) => LookupResult::Found(value),
                HashTree::Empty => LookupResult::Absent,
                HashTree::Pruned(_) => LookupResult::Unknown,
                HashTree::Fork(..) | HashTree::Labeled(..) => LookupResult::Error,
            };
        };

        match self.find_label(label.as_ref()) {
            LabelSearch::Found(subtree) => subtree.lookup_path(rest),
            LabelSearch::Absent | LabelSearch::Less | LabelSearch::Greater => LookupResult::Absent,
            LabelSearch::Unknown => LookupResult::Unknown,
            LabelSearch::Error => LookupResult::Error,
        }
    }

    fn find_label(&self, label: &[u8]) -> LabelSearch<'_> {
        match self {
            HashTree::Labeled(node_label, subtree) => match label.cmp(node_label.as_slice()) {
                Ordering::Less => LabelSearch::Less,
                Ordering::Equal => LabelSearch::Found(subtree),
                Ordering::Greater => LabelSearch::Greater,
            },
            HashTree::Fork(left, right) => match left.find_label(label) {
                LabelSearch::Greater => match right.find_label(label) {
                    LabelSearch::Less => LabelSearch::Absent,
                    other => other,
                },
                LabelSearch::Unknown => match right.find_label(label) {
                    LabelSearch::Less => LabelSearch::Unknown,
                    other => other,
                },
                other => other,
            },
            HashTree::Pruned(_) => LabelSearch::Unknown,
            HashTree::Empty => LabelSearch::Absent,
            HashTree::Leaf(_) => LabelSearch::Error,
        }
    }

    /// Decode the CBOR array form `[tag, ...]`.
    pub fn from_cbor(value: &Value) -> Result<Self, String> {
        Self::from_cbor_at(value, 0)
    }

    fn from_cbor_at(value: &Value, depth: usize) -> Result<Self, String> {
        if depth > MAX_TREE_DEPTH {
            return Err("hash tree nested too deeply".to_string());
        }
        let Value::Array(items) = value else {
            return Err("hash tree node is not an array".to_string());
        };
        let tag = items
            .first()
            .and_then(cbor::as_u64)
            .ok_or("hash tree node has no tag")?;

        let bytes_at = |i: usize| -> Result<&[u8], String> {
            items
                .get(i)
                .and_then(cbor::as_bytes)
                .ok_or_else(|| format!("hash tree node {} expects bytes at {}", tag, i))
        };
        let node_at = |i: usize| -> Result<HashTree, String> {
            let child = items
                .get(i)
                .ok_or_else(|| format!("hash tree node {} missing child {}", tag, i))?;
            Self::from_cbor_at(child, depth + 1)
        };

        let (node, arity) = match tag {
            EMPTY_TAG => (HashTree::Empty, 1),
            FORK_TAG => (HashTree::fork(node_at(1)?, node_at(2)?), 3),
            LABELED_TAG => (HashTree::labeled(bytes_at(1)?, node_at(2)?), 3),
            LEAF_TAG => (HashTree::leaf(bytes_at(1)?), 2),
            PRUNED_TAG => {
                let hash: [u8; 32] = bytes_at(1)?
                    .try_into()
                    .map_err(|_| "pruned hash must be 32 bytes".to_string())?;
                (HashTree::Pruned(hash), 2)
            }
            other => return Err(format!("unknown hash tree tag {}", other)),
        };
        if items.len() != arity {
            return Err(format!(
                "hash tree node {} has {} elements, expected {}",
                tag,
                items.len(),
                arity
            ));
        }
        Ok(node)
    }

    pub fn to_cbor(&self) -> Value {
        let tag = |t: u64| Value::Integer(t.into());
        match self {
            HashTree::Empty => Value::Array(vec![tag(EMPTY_TAG)]),
            HashTree::Fork(left, right) => {
                Value::Array(vec![tag(FORK_TAG), left.to_cbor(), right.to_cbor()])
            }
            HashTree::Labeled(label, subtree) => Value::Array(vec![
                tag(LABELED_TAG),
                Value::Bytes(label.clone()),
                subtree.to_cbor(),
            ]),
            HashTree::Leaf(value) => Value::Array(vec![tag(LEAF_TAG), Value::Bytes(value.clone())]),
            HashTree::Pruned(hash) => Value::Array(vec![tag(PRUNED_TAG), Value::Bytes(hash.to_vec())]),
        }
    }
}

impl fmt::Debug for HashTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn label_str(label: &[u8]) -> String {
            match std::str::from_utf8(label) {
                Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => s.to_string(),
                _ => format!("0x{}", hex::encode(label)),
            }
        }

        match self {
            HashTree::Empty => f.write_str("Empty"),
            HashTree::Fork(left, right) => f.debug_tuple("Fork").field(left).field(right).finish(),
            HashTree::Labeled(label, subtree) => f
                .debug_tuple("Labeled")
                .field(&label_str(label))
                .field(subtree)
                .finish(),
            HashTree::Leaf(value) => write!(f, "Leaf(0x{})", hex::encode(value)),
            HashTree::Pruned(hash) => write!(f, "Pruned(0x{})", hex::encode(hash)),
        }
    }
}
