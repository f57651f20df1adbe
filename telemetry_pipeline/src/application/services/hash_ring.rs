// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Hash Ring
//!
//! Consistent-hash ring over the configured peer endpoints. No
//! consistent-hashing crate appears anywhere in the retrieved corpus, so
//! the ring is hand-built: a `BTreeMap<u64, PeerId>` populated with
//! `virtual_nodes_per_peer` points per peer, each point positioned by
//! `sha256("{peer}-{vnode_index}")`'s first 8 bytes read as a big-endian
//! `u64`.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

pub type PeerId = String;

pub struct HashRing {
    ring: BTreeMap<u64, PeerId>,
}

fn point_hash(peer: &str, vnode_index: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(format!("{peer}-{vnode_index}").as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is at least 8 bytes"))
}

impl HashRing {
    pub fn new(peers: &[PeerId], virtual_nodes_per_peer: u32) -> Self {
        let mut ring = BTreeMap::new();
        for peer in peers {
            for vnode in 0..virtual_nodes_per_peer {
                ring.insert(point_hash(peer, vnode), peer.clone());
            }
        }
        Self { ring }
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Hashes `key` with the same function used to place ring points, then
    /// finds the first peer whose point is at or after that position,
    /// wrapping around to the first peer if none is found.
    pub fn peer_for_key(&self, key: &str) -> Option<&PeerId> {
        if self.ring.is_empty() {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let key_hash = u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is at least 8 bytes"));
        self.ring.range(key_hash..).next().map(|(_, peer)| peer).or_else(|| self.ring.values().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_resolves_to_none() {
        let ring = HashRing::new(&[], 10);
        assert_eq!(ring.peer_for_key("x"), None);
    }

    #[test]
    fn lookup_is_deterministic() {
        let peers = vec!["node-0".to_string(), "node-1".to_string()];
        let ring = HashRing::new(&peers, 10);
        let a = ring.peer_for_key("trace-1").cloned();
        let b = ring.peer_for_key("trace-1").cloned();
        assert_eq!(a, b);
    }

    #[test]
    fn identical_rings_agree_across_instances() {
        let peers = vec!["node-0".to_string(), "node-1".to_string(), "node-2".to_string()];
        let ring_a = HashRing::new(&peers, 16);
        let ring_b = HashRing::new(&peers, 16);
        for key in ["t1", "t2", "t3", "abc", "xyz"] {
            assert_eq!(ring_a.peer_for_key(key), ring_b.peer_for_key(key));
        }
    }

    #[test]
    fn single_peer_receives_every_key() {
        let peers = vec!["only-node".to_string()];
        let ring = HashRing::new(&peers, 8);
        for key in ["t1", "t2", "t3"] {
            assert_eq!(ring.peer_for_key(key), Some(&"only-node".to_string()));
        }
    }
}
