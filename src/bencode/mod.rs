//! Bencode module
//!
//! Self-contained codec for the four bencode value kinds used on the
//! DHT wire and inside `.torrent` files.

pub mod value;
pub mod decode;
pub mod encode;

// Re-exports for convenience
pub use value::{Dict, Value};
pub use decode::{decode, MAX_DEPTH};
pub use encode::encode;
