//! DHT node module
//!
//! Node identifiers and the peer references harvested from the network.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Length of a node id and of an info-hash on the mainline DHT
pub const ID_LENGTH: usize = 20;

/// DHT node identifier (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; ID_LENGTH]);

impl NodeId {
    /// Create a new NodeId from bytes
    pub fn new(id: [u8; ID_LENGTH]) -> Self {
        Self(id)
    }

    /// Generate a random NodeId
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut id = [0u8; ID_LENGTH];
        rng.fill(&mut id);
        Self(id)
    }

    /// Get the NodeId as bytes
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    /// Get the NodeId as a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A peer learned from a compact node record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerRef {
    pub id: NodeId,
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerRef {
    /// Create a new peer reference
    pub fn new(id: NodeId, ip: Ipv4Addr, port: u16) -> Self {
        Self { id, ip, port }
    }

    /// UDP address to probe this peer at
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Whether the address can be probed at all
    pub fn is_routable(&self) -> bool {
        !self.ip.is_unspecified() && !self.ip.is_broadcast() && self.port != 0
    }
}

/// Identity of one crawl node, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlNodeIdentity {
    pub self_id: NodeId,
    pub bind_addr: SocketAddr,
}

impl CrawlNodeIdentity {
    /// Create an identity with a freshly generated id
    pub fn generate(bind_addr: SocketAddr) -> Self {
        Self {
            self_id: NodeId::random(),
            bind_addr,
        }
    }
}
