//! Compact format parsers
//!
//! Fixed-width binary encodings carried inside bencoded KRPC values.

use crate::dht::node::{NodeId, PeerRef, ID_LENGTH};
use std::net::Ipv4Addr;

/// Length of a compact node record: 20 bytes id + 4 bytes IPv4 + 2 bytes port
pub const COMPACT_NODE_LENGTH: usize = 26;

/// Parse a compact node blob into peer references.
///
/// Trailing bytes that do not form a whole record are ignored, since some
/// peers truncate the final entry.
pub fn parse_nodes(blob: &[u8]) -> Vec<PeerRef> {
    blob.chunks_exact(COMPACT_NODE_LENGTH)
        .map(|chunk| {
            let mut id = [0u8; ID_LENGTH];
            id.copy_from_slice(&chunk[..ID_LENGTH]);
            let ip = Ipv4Addr::new(chunk[20], chunk[21], chunk[22], chunk[23]);
            let port = u16::from_be_bytes([chunk[24], chunk[25]]);
            PeerRef::new(NodeId::new(id), ip, port)
        })
        .collect()
}

/// Serialize peers to compact node format
pub fn encode_nodes(peers: &[PeerRef]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(peers.len() * COMPACT_NODE_LENGTH);
    for peer in peers {
        buffer.extend_from_slice(peer.id.as_bytes());
        buffer.extend_from_slice(&peer.ip.octets());
        buffer.extend_from_slice(&peer.port.to_be_bytes());
    }
    buffer
}

/// Render raw digest bytes as uppercase hex with no separators
pub fn parse_hash(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}
