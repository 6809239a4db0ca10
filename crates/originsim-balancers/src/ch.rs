//! Consistent-hash strategy.
//!
//! Each server contributes `replicas` virtual nodes keyed `"{id}-{i}"` and
//! hashed with 32-bit FNV-1a. A session hashes its id (little-endian bytes)
//! onto the ring and lands on the first node clockwise. Declines when the
//! ring's choice is overloaded; stickiness beats spillover here.

use crate::traits::Balancer;
use originsim_model::Server;
use std::sync::Arc;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

pub(crate) fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[derive(Debug, Clone, Copy)]
struct VirtualNode {
    hash: u32,
    server_index: usize,
}

pub struct ConsistentHash {
    servers: Vec<Arc<Server>>,
    /// Sorted ascending by hash.
    ring: Vec<VirtualNode>,
}

impl ConsistentHash {
    pub fn new(servers: Vec<Arc<Server>>, replicas: u32) -> Self {
        let mut ring = Vec::with_capacity(servers.len() * replicas as usize);
        for (server_index, server) in servers.iter().enumerate() {
            for i in 0..replicas {
                let key = format!("{}-{}", server.id, i);
                ring.push(VirtualNode {
                    hash: fnv1a_32(key.as_bytes()),
                    server_index,
                });
            }
        }
        ring.sort_by_key(|node| node.hash);
        Self { servers, ring }
    }

    /// First node with hash >= key, wrapping to the ring start.
    fn lookup(&self, hash: u32) -> Option<&Arc<Server>> {
        if self.ring.is_empty() {
            return None;
        }
        let idx = self.ring.partition_point(|node| node.hash < hash);
        let node = if idx == self.ring.len() {
            &self.ring[0]
        } else {
            &self.ring[idx]
        };
        Some(&self.servers[node.server_index])
    }
}

impl Balancer for ConsistentHash {
    fn pick(&self, session_id: u64) -> Option<Arc<Server>> {
        let hash = fnv1a_32(&session_id.to_le_bytes());
        let server = self.lookup(hash)?;
        if server.is_overloaded() {
            return None;
        }
        Some(Arc::clone(server))
    }

    fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }
}
