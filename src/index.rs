//! Lookup from read name to the read group id seen for it in the donor BAM.
//!
//! The default [`HashedIndex`] only keeps a 32 bit hash of each name next to the id, so memory
//! stays at a few bytes per read. Two names with the same hash share a slot and the last one
//! recorded wins; a lookup cannot tell such a collision from a real hit. [`VerifiedIndex`] keys on
//! the full name instead for callers that can afford the memory.

use ahash::AHashMap;
use clap::ValueEnum;

use crate::catalog::ReadGroupId;

pub trait IdentityIndex {
    /// Remember `id` for `identity`, replacing any earlier entry in the same slot.
    fn record(&mut self, identity: &[u8], id: ReadGroupId);

    fn lookup(&self, identity: &[u8]) -> Option<ReadGroupId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum IndexMode {
    /// Store a 32 bit hash per read name (small, collisions go undetected)
    #[default]
    Hashed,
    /// Store full read names (exact, uses more memory)
    Verified,
}

impl IndexMode {
    pub fn build(self) -> Box<dyn IdentityIndex> {
        match self {
            IndexMode::Hashed => Box::new(HashedIndex::default()),
            IndexMode::Verified => Box::new(VerifiedIndex::default()),
        }
    }
}

/// X31 string hash followed by the murmur3 finalizer.
///
/// Stable across runs and platforms, unlike the randomly seeded hasher behind `AHashMap`.
pub fn identity_hash(identity: &[u8]) -> u32 {
    let h = identity
        .iter()
        .fold(0u32, |h, &b| h.wrapping_mul(31).wrapping_add(u32::from(b)));
    fmix32(h)
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[derive(Debug, Default)]
pub struct HashedIndex(AHashMap<u32, ReadGroupId>);

impl IdentityIndex for HashedIndex {
    fn record(&mut self, identity: &[u8], id: ReadGroupId) {
        self.0.insert(identity_hash(identity), id);
    }

    fn lookup(&self, identity: &[u8]) -> Option<ReadGroupId> {
        self.0.get(&identity_hash(identity)).copied()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Default)]
pub struct VerifiedIndex(AHashMap<Box<[u8]>, ReadGroupId>);

impl IdentityIndex for VerifiedIndex {
    fn record(&mut self, identity: &[u8], id: ReadGroupId) {
        if let Some(slot) = self.0.get_mut(identity) {
            *slot = id;
        } else {
            self.0.insert(identity.into(), id);
        }
    }

    fn lookup(&self, identity: &[u8]) -> Option<ReadGroupId> {
        self.0.get(identity).copied()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReadGroupCatalog;

    fn ids() -> (ReadGroupId, ReadGroupId) {
        let mut c = ReadGroupCatalog::new();
        (c.intern("a").unwrap(), c.intern("b").unwrap())
    }

    #[test]
    fn hash_is_stable() {
        assert_eq!(identity_hash(b"read1"), identity_hash(b"read1"));
        assert_ne!(identity_hash(b"read1"), identity_hash(b"read2"));
        assert_eq!(identity_hash(b""), 0);
    }

    #[test]
    fn record_and_lookup() {
        let (a, b) = ids();
        for mode in [IndexMode::Hashed, IndexMode::Verified] {
            let mut index = mode.build();
            assert!(index.is_empty());
            index.record(b"r1", a);
            index.record(b"r2", b);
            assert_eq!(index.lookup(b"r1"), Some(a));
            assert_eq!(index.lookup(b"r2"), Some(b));
            assert_eq!(index.lookup(b"r3"), None);

            // mates share a name, last write wins
            index.record(b"r1", b);
            assert_eq!(index.lookup(b"r1"), Some(b));
            assert_eq!(index.len(), 2);
        }
    }

    #[test]
    fn hashed_collision_keeps_latest() {
        // "Aa" and "BB" share an X31 hash
        assert_eq!(identity_hash(b"Aa"), identity_hash(b"BB"));
        let (a, b) = ids();

        let mut hashed = HashedIndex::default();
        hashed.record(b"Aa", a);
        hashed.record(b"BB", b);
        assert_eq!(hashed.len(), 1);
        assert_eq!(hashed.lookup(b"Aa"), Some(b));
        assert_eq!(hashed.lookup(b"BB"), Some(b));

        let mut verified = VerifiedIndex::default();
        verified.record(b"Aa", a);
        verified.record(b"BB", b);
        assert_eq!(verified.len(), 2);
        assert_eq!(verified.lookup(b"Aa"), Some(a));
        assert_eq!(verified.lookup(b"BB"), Some(b));
    }
}
