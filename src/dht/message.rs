//! KRPC message module
//!
//! Classifies decoded bencode dictionaries into queries, responses and
//! errors, and extracts the fields the crawler harvests from them.

use crate::bencode::{self, Dict, Value};
use crate::dht::compact::parse_nodes;
use crate::dht::node::{NodeId, PeerRef, ID_LENGTH};
use crate::error::CrawlError;
use bytes::Bytes;

/// Length of the transaction ids this node generates
pub const TRANSACTION_ID_LENGTH: usize = 4;

/// KRPC query methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMethod {
    Ping,
    FindNode,
    GetPeers,
    AnnouncePeer,
    Other(String),
}

impl QueryMethod {
    fn from_wire(name: &[u8]) -> Self {
        match name {
            b"ping" => QueryMethod::Ping,
            b"find_node" => QueryMethod::FindNode,
            b"get_peers" => QueryMethod::GetPeers,
            b"announce_peer" => QueryMethod::AnnouncePeer,
            other => QueryMethod::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            QueryMethod::Ping => "ping",
            QueryMethod::FindNode => "find_node",
            QueryMethod::GetPeers => "get_peers",
            QueryMethod::AnnouncePeer => "announce_peer",
            QueryMethod::Other(name) => name,
        }
    }
}

impl std::fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified KRPC message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KrpcMessage {
    Query {
        transaction_id: Bytes,
        method: QueryMethod,
        args: Dict,
    },
    Response {
        transaction_id: Bytes,
        values: Dict,
    },
    Error {
        transaction_id: Bytes,
        detail: Value,
    },
}

/// What an inbound message means to the crawler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KrpcEvent {
    /// A response carrying compact node records
    NodesFound(Vec<PeerRef>),
    /// A `get_peers` or `announce_peer` query naming an info-hash
    InfoHashSeen {
        method: QueryMethod,
        info_hash: [u8; ID_LENGTH],
    },
    /// A well-formed message the crawler has no use for
    Ignored(&'static str),
}

fn dict_bytes<'a>(dict: &'a Dict, key: &str) -> Option<&'a Bytes> {
    dict.get(key.as_bytes()).and_then(Value::as_bytes)
}

fn missing(field: &str) -> CrawlError {
    CrawlError::validation_error_with_field("required field missing or mistyped", field)
}

impl KrpcMessage {
    /// Decode a datagram and classify it
    pub fn from_bytes(data: &[u8]) -> Result<Self, CrawlError> {
        Self::classify(bencode::decode(data)?)
    }

    /// Classify a decoded value by its `y` field
    pub fn classify(value: Value) -> Result<Self, CrawlError> {
        let kind = value.kind();
        let mut dict = value.into_dict().ok_or_else(|| {
            CrawlError::validation_error(format!("KRPC message must be a dictionary, got {}", kind))
        })?;

        let transaction_id = dict_bytes(&dict, "t").cloned().unwrap_or_default();
        let y = dict_bytes(&dict, "y").cloned().ok_or_else(|| missing("y"))?;

        match y.as_ref() {
            b"q" => {
                let method = dict_bytes(&dict, "q")
                    .map(|name| QueryMethod::from_wire(name))
                    .ok_or_else(|| missing("q"))?;
                let args = dict
                    .remove(b"a".as_slice())
                    .and_then(Value::into_dict)
                    .ok_or_else(|| missing("a"))?;
                Ok(KrpcMessage::Query { transaction_id, method, args })
            }
            b"r" => {
                let values = dict
                    .remove(b"r".as_slice())
                    .and_then(Value::into_dict)
                    .ok_or_else(|| missing("r"))?;
                Ok(KrpcMessage::Response { transaction_id, values })
            }
            b"e" => {
                let detail = dict.remove(b"e".as_slice()).unwrap_or(Value::List(Vec::new()));
                Ok(KrpcMessage::Error { transaction_id, detail })
            }
            other => Err(CrawlError::validation_error_with_field(
                format!("unknown message type '{}'", String::from_utf8_lossy(other)),
                "y",
            )),
        }
    }

    /// Create a find_node query
    pub fn find_node_query(transaction_id: Bytes, sender: NodeId, target: NodeId) -> Self {
        let args = [
            ("id", Value::bytes(sender.as_bytes())),
            ("target", Value::bytes(target.as_bytes())),
        ]
        .into_iter()
        .map(|(k, v)| (Bytes::from_static(k.as_bytes()), v))
        .collect();

        KrpcMessage::Query {
            transaction_id,
            method: QueryMethod::FindNode,
            args,
        }
    }

    /// Convert back into the bencode dictionary carried on the wire
    pub fn to_value(&self) -> Value {
        match self {
            KrpcMessage::Query { transaction_id, method, args } => Value::dict([
                ("t", Value::Bytes(transaction_id.clone())),
                ("y", Value::string("q")),
                ("q", Value::string(method.as_str())),
                ("a", Value::Dict(args.clone())),
            ]),
            KrpcMessage::Response { transaction_id, values } => Value::dict([
                ("t", Value::Bytes(transaction_id.clone())),
                ("y", Value::string("r")),
                ("r", Value::Dict(values.clone())),
            ]),
            KrpcMessage::Error { transaction_id, detail } => Value::dict([
                ("t", Value::Bytes(transaction_id.clone())),
                ("y", Value::string("e")),
                ("e", detail.clone()),
            ]),
        }
    }

    /// Serialize to a datagram payload
    pub fn serialize(&self) -> Vec<u8> {
        bencode::encode(&self.to_value())
    }

    /// Get the message type as it appears in `y`
    pub fn message_type(&self) -> &'static str {
        match self {
            KrpcMessage::Query { .. } => "q",
            KrpcMessage::Response { .. } => "r",
            KrpcMessage::Error { .. } => "e",
        }
    }

    pub fn transaction_id(&self) -> &Bytes {
        match self {
            KrpcMessage::Query { transaction_id, .. }
            | KrpcMessage::Response { transaction_id, .. }
            | KrpcMessage::Error { transaction_id, .. } => transaction_id,
        }
    }

    /// `r.id` of a response
    pub fn responder_id(&self) -> Option<&Bytes> {
        match self {
            KrpcMessage::Response { values, .. } => dict_bytes(values, "id"),
            _ => None,
        }
    }

    /// `r.nodes` of a response
    pub fn compact_nodes(&self) -> Option<&Bytes> {
        match self {
            KrpcMessage::Response { values, .. } => dict_bytes(values, "nodes"),
            _ => None,
        }
    }

    /// `a.id` of a query
    pub fn querier_id(&self) -> Option<&Bytes> {
        match self {
            KrpcMessage::Query { args, .. } => dict_bytes(args, "id"),
            _ => None,
        }
    }

    /// `a.info_hash` of a query
    pub fn info_hash(&self) -> Option<&Bytes> {
        match self {
            KrpcMessage::Query { args, .. } => dict_bytes(args, "info_hash"),
            _ => None,
        }
    }

    /// Work out what this message means to the crawler.
    ///
    /// Transaction ids are not correlated: any response carrying nodes is
    /// used no matter which query it nominally answers.
    pub fn interpret(&self) -> Result<KrpcEvent, CrawlError> {
        match self {
            KrpcMessage::Query { method, .. } => match method {
                QueryMethod::GetPeers | QueryMethod::AnnouncePeer => {
                    let raw = self.info_hash().ok_or_else(|| missing("a.info_hash"))?;
                    let info_hash: [u8; ID_LENGTH] = raw.as_ref().try_into().map_err(|_| {
                        CrawlError::validation_error_with_field(
                            format!("info_hash must be {} bytes, got {}", ID_LENGTH, raw.len()),
                            "a.info_hash",
                        )
                    })?;
                    Ok(KrpcEvent::InfoHashSeen {
                        method: method.clone(),
                        info_hash,
                    })
                }
                _ => Ok(KrpcEvent::Ignored("query method not harvested")),
            },
            KrpcMessage::Response { .. } => {
                let nodes = self.compact_nodes().ok_or_else(|| missing("r.nodes"))?;
                Ok(KrpcEvent::NodesFound(parse_nodes(nodes)))
            }
            KrpcMessage::Error { .. } => Ok(KrpcEvent::Ignored("error message")),
        }
    }
}

/// Generate a random transaction id
pub fn generate_transaction_id() -> Bytes {
    use rand::Rng;
    let id: [u8; TRANSACTION_ID_LENGTH] = rand::thread_rng().gen();
    Bytes::copy_from_slice(&id)
}
