//! Crawl node
//!
//! One UDP endpoint that keeps asking peers for more peers and records every
//! info-hash other nodes query it about. It never answers anybody.

use crate::dht::bootstrap::resolve_seeds;
use crate::dht::config::CrawlerConfig;
use crate::dht::message::{generate_transaction_id, KrpcEvent, KrpcMessage, QueryMethod};
use crate::dht::node::{CrawlNodeIdentity, NodeId, PeerRef, ID_LENGTH};
use crate::dht::table::NodeTable;
use crate::error::CrawlError;
use crate::store::MagnetStore;
use crate::torrent::Magnet;
use anyhow::Result;
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Outcome of handling one inbound datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Compact nodes were appended to the table
    Nodes { added: usize, rejected: usize },
    /// An info-hash was seen; `forwarded` is false when it was already
    /// reported recently and the store was not called
    Magnet { uri: String, forwarded: bool },
    /// Valid KRPC the crawler has no use for
    Ignored(&'static str),
}

/// Bounded memory of recently discovered hashes, oldest forgotten first
#[derive(Debug)]
struct SeenHashes {
    order: VecDeque<[u8; ID_LENGTH]>,
    members: HashSet<[u8; ID_LENGTH]>,
    capacity: usize,
}

impl SeenHashes {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity,
        }
    }

    fn contains(&self, hash: &[u8; ID_LENGTH]) -> bool {
        self.members.contains(hash)
    }

    fn insert(&mut self, hash: [u8; ID_LENGTH]) {
        if self.capacity == 0 || !self.members.insert(hash) {
            return;
        }
        self.order.push_back(hash);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }
}

/// Running counters of one crawl node
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub datagrams: AtomicU64,
    pub queries_sent: AtomicU64,
    pub nodes_added: AtomicU64,
    pub magnets: AtomicU64,
    pub decode_errors: AtomicU64,
    pub validation_errors: AtomicU64,
    pub transport_errors: AtomicU64,
    pub store_errors: AtomicU64,
    /// Errors of any other class
    pub other_errors: AtomicU64,
}

/// Point-in-time copy of [`CrawlStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub datagrams: u64,
    pub queries_sent: u64,
    pub nodes_added: u64,
    pub magnets: u64,
    pub errors: u64,
}

impl CrawlStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn record_error(&self, err: &CrawlError) {
        let counter = match err {
            CrawlError::DecodeError { .. } => &self.decode_errors,
            CrawlError::ValidationError { .. } => &self.validation_errors,
            CrawlError::TransportError { .. } => &self.transport_errors,
            CrawlError::StoreError { .. } => &self.store_errors,
            CrawlError::ParseError { .. } | CrawlError::RpcError { .. } | CrawlError::ConfigError { .. } => {
                &self.other_errors
            }
        };
        Self::bump(counter, 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            datagrams: load(&self.datagrams),
            queries_sent: load(&self.queries_sent),
            nodes_added: load(&self.nodes_added),
            magnets: load(&self.magnets),
            errors: load(&self.decode_errors)
                + load(&self.validation_errors)
                + load(&self.transport_errors)
                + load(&self.store_errors)
                + load(&self.other_errors),
        }
    }
}

/// A passive DHT crawler bound to one UDP port
pub struct CrawlNode {
    name: String,
    identity: CrawlNodeIdentity,
    config: CrawlerConfig,
    socket: UdpSocket,
    table: NodeTable,
    store: Arc<dyn MagnetStore>,
    seen: Mutex<SeenHashes>,
    stats: CrawlStats,
}

impl CrawlNode {
    /// Validate the configuration and bind `bind_ip:port`
    pub async fn bind(
        name: impl Into<String>,
        config: CrawlerConfig,
        port: u16,
        store: Arc<dyn MagnetStore>,
    ) -> Result<Self> {
        let name = name.into();
        config.validate()?;

        let bind_addr = SocketAddr::new(config.bind_ip, port);
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
            error!("{}: failed to bind UDP socket to {}: {}", name, bind_addr, e);
            CrawlError::transport_error_full("Failed to bind UDP socket", bind_addr.to_string(), e.to_string())
        })?;
        let local_addr = socket.local_addr().map_err(|e| {
            CrawlError::transport_error_full("Failed to get local address", bind_addr.to_string(), e.to_string())
        })?;

        let identity = CrawlNodeIdentity::generate(local_addr);
        info!("{} listening on {} with id {}", name, local_addr, identity.self_id);

        Ok(Self {
            name,
            identity,
            table: NodeTable::new(config.table_capacity),
            seen: Mutex::new(SeenHashes::new(config.seen_capacity)),
            config,
            socket,
            store,
            stats: CrawlStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &CrawlNodeIdentity {
        &self.identity
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.identity.bind_addr
    }

    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Send a `find_node` query with a fresh transaction id and a random target
    pub async fn send_find_node(&self, addr: SocketAddr, sender: NodeId) -> Result<(), CrawlError> {
        let message = KrpcMessage::find_node_query(generate_transaction_id(), sender, NodeId::random());
        self.socket
            .send_to(&message.serialize(), addr)
            .await
            .map_err(|e| CrawlError::transport_error_full("Failed to send find_node", addr.to_string(), e.to_string()))?;
        CrawlStats::bump(&self.stats.queries_sent, 1);
        trace!("Sent find_node to {}", addr);
        Ok(())
    }

    /// Send one `find_node` to every seed that resolves.
    ///
    /// Returns the number of queries actually sent.
    pub async fn bootstrap(&self) -> usize {
        let seeds = resolve_seeds(&self.config.seeds).await;
        if seeds.is_empty() {
            warn!("No bootstrap seed could be resolved");
            return 0;
        }

        let mut sent = 0;
        for addr in seeds {
            match self.send_find_node(addr, self.identity.self_id).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    self.stats.record_error(&e);
                    debug!(kind = e.kind(), "Bootstrap query failed: {}", e);
                }
            }
            sleep(self.config.send_interval).await;
        }
        debug!("Bootstrap round sent {} queries", sent);
        sent
    }

    /// Probe table entries forever, re-bootstrapping whenever the table runs dry
    pub async fn send_loop(&self) {
        loop {
            match self.table.pop().await {
                Some(peer) => {
                    // Impersonate the peer so it keeps us out of its own table
                    if let Err(e) = self.send_find_node(peer.socket_addr(), peer.id).await {
                        self.stats.record_error(&e);
                        trace!(kind = e.kind(), "{}", e);
                    }
                    sleep(self.config.send_interval).await;
                }
                None => {
                    debug!("Node table empty, bootstrapping");
                    self.bootstrap().await;
                    sleep(self.config.empty_table_backoff).await;
                }
            }
        }
    }

    /// Receive and handle datagrams forever
    pub async fn receive_loop(&self) {
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        loop {
            match self.receive_once(&mut buf).await {
                Ok(outcome) => trace!("{:?}", outcome),
                Err(e) => {
                    self.stats.record_error(&e);
                    match e {
                        CrawlError::StoreError { .. } => warn!(kind = e.kind(), "{}", e),
                        _ => trace!(kind = e.kind(), "Dropped datagram: {}", e),
                    }
                }
            }
        }
    }

    /// Wait for one datagram and handle it
    pub async fn receive_once(&self, buf: &mut [u8]) -> Result<Handled, CrawlError> {
        let (len, from) = self.socket.recv_from(buf).await.map_err(|e| {
            CrawlError::transport_error_full("Failed to receive datagram", self.local_addr().to_string(), e.to_string())
        })?;
        self.handle_datagram(&buf[..len], from).await
    }

    /// Decode, classify and act on one datagram
    pub async fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> Result<Handled, CrawlError> {
        CrawlStats::bump(&self.stats.datagrams, 1);
        let message = KrpcMessage::from_bytes(data).map_err(|e| e.with_context(format!("from {}", from)))?;

        match message.interpret()? {
            KrpcEvent::NodesFound(peers) => {
                let total = peers.len();
                let routable: Vec<PeerRef> = peers.into_iter().filter(PeerRef::is_routable).collect();
                let added = routable.len();
                self.table.extend(routable).await;
                CrawlStats::bump(&self.stats.nodes_added, added as u64);
                trace!("{} nodes from {} ({} rejected)", added, from, total - added);
                Ok(Handled::Nodes {
                    added,
                    rejected: total - added,
                })
            }
            KrpcEvent::InfoHashSeen { method, info_hash } => self.record_info_hash(method, info_hash, from).await,
            KrpcEvent::Ignored(reason) => Ok(Handled::Ignored(reason)),
        }
    }

    async fn record_info_hash(
        &self,
        method: QueryMethod,
        info_hash: [u8; ID_LENGTH],
        from: SocketAddr,
    ) -> Result<Handled, CrawlError> {
        let uri = Magnet::from_info_hash(info_hash).uri();
        if self.seen.lock().await.contains(&info_hash) {
            return Ok(Handled::Magnet { uri, forwarded: false });
        }

        self.store
            .add(&uri)
            .await
            .map_err(|e| CrawlError::store_error(format!("Failed to add {}: {}", uri, e)))?;
        self.seen.lock().await.insert(info_hash);
        CrawlStats::bump(&self.stats.magnets, 1);

        info!("{} from {}: {}", method, from, uri);
        Ok(Handled::Magnet { uri, forwarded: true })
    }

    /// Periodically re-bootstrap and log telemetry
    pub async fn reporter(&self) {
        let mut ticker = interval(self.config.report_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.bootstrap().await;

            let stored = match self.store.count().await {
                Ok(count) => count.to_string(),
                Err(e) => {
                    warn!("Failed to count stored magnets: {}", e);
                    "?".to_string()
                }
            };
            let stats = self.stats.snapshot();
            info!(
                "{} nodes in table, {} magnets stored, {} datagrams, {} queries sent, {} errors",
                self.table.len().await,
                stored,
                stats.datagrams,
                stats.queries_sent,
                stats.errors
            );
        }
    }

    /// Run the send, receive and report loops until one of them stops
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let span = info_span!("crawl_node", name = %self.name);

        let sender = Arc::clone(&self);
        let receiver = Arc::clone(&self);
        let reporter = Arc::clone(&self);
        let send_task = tokio::spawn(async move { sender.send_loop().await }.instrument(span.clone()));
        let recv_task = tokio::spawn(async move { receiver.receive_loop().await }.instrument(span.clone()));
        let report_task = tokio::spawn(async move { reporter.reporter().await }.instrument(span));

        tokio::try_join!(send_task, recv_task, report_task).map_err(|e| {
            error!("{}: crawl task failed: {}", self.name, e);
            CrawlError::transport_error(format!("{} task failed: {}", self.name, e))
        })?;
        Ok(())
    }
}

/// Start `count` crawl nodes on consecutive ports from `base_port`.
///
/// Every port is bound before any node starts, so a taken port fails the
/// whole launch. Nodes share nothing but the store.
pub async fn run_crawlers(
    count: usize,
    base_port: u16,
    config: CrawlerConfig,
    store: Arc<dyn MagnetStore>,
) -> Result<()> {
    if count == 0 {
        return Err(CrawlError::config_error_with_field("must be at least 1", "count").into());
    }

    let mut nodes = Vec::with_capacity(count);
    for index in 0..count {
        let port = u16::try_from(index)
            .ok()
            .and_then(|offset| base_port.checked_add(offset))
            .ok_or_else(|| CrawlError::config_error_with_field("port range exceeds 65535", "base_port"))?;
        let node = CrawlNode::bind(format!("SERVER{}", index), config.clone(), port, Arc::clone(&store)).await?;
        nodes.push(Arc::new(node));
    }

    info!("Started {} crawl nodes from port {}", nodes.len(), base_port);

    let mut tasks = JoinSet::new();
    for node in nodes {
        tasks.spawn(node.run());
    }
    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| CrawlError::transport_error(format!("crawl node panicked: {}", e)))??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{self, Value};
    use crate::dht::compact::encode_nodes;
    use crate::store::MemoryStore;
    use crate::store::MagnetSet;
    use async_trait::async_trait;
    use rand::{Rng, SeedableRng};
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Store that records every call it receives
    #[derive(Default)]
    struct RecordingStore {
        adds: std::sync::Mutex<Vec<String>>,
        /// Number of upcoming adds to fail
        failing: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl MagnetStore for RecordingStore {
        async fn add_to(&self, _set: MagnetSet, magnet: &str) -> anyhow::Result<bool> {
            let failing = self
                .failing
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                anyhow::bail!("disk full");
            }
            self.adds.lock().unwrap().push(magnet.to_string());
            Ok(true)
        }

        async fn count_in(&self, _set: MagnetSet) -> anyhow::Result<usize> {
            Ok(self.adds.lock().unwrap().len())
        }

        async fn difference(&self, _set: MagnetSet, _minus: MagnetSet, _limit: usize) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn loopback_config(seeds: &[SocketAddr]) -> CrawlerConfig {
        let mut config = CrawlerConfig::default().with_seeds(seeds.iter().map(|s| s.to_string()));
        config.bind_ip = Ipv4Addr::LOCALHOST.into();
        config.send_interval = Duration::from_millis(1);
        config.empty_table_backoff = Duration::from_millis(50);
        config
    }

    async fn node_with(store: Arc<dyn MagnetStore>, seeds: &[SocketAddr]) -> CrawlNode {
        CrawlNode::bind("SERVER0", loopback_config(seeds), 0, store).await.unwrap()
    }

    fn sequential_hash() -> [u8; 20] {
        let mut hash = [0u8; 20];
        for (i, byte) in hash.iter_mut().enumerate() {
            *byte = i as u8 + 1;
        }
        hash
    }

    fn get_peers_query(info_hash: &[u8]) -> Vec<u8> {
        bencode::encode(&Value::dict([
            ("t", Value::string("aa")),
            ("y", Value::string("q")),
            ("q", Value::string("get_peers")),
            ("a", Value::dict([("id", Value::bytes(&[7; 20])), ("info_hash", Value::bytes(info_hash))])),
        ]))
    }

    fn find_node_response(peers: &[PeerRef]) -> Vec<u8> {
        bencode::encode(&Value::dict([
            ("t", Value::string("zz")),
            ("y", Value::string("r")),
            ("r", Value::dict([("id", Value::bytes(&[9; 20])), ("nodes", Value::bytes(&encode_nodes(peers)))])),
        ]))
    }

    fn from_addr() -> SocketAddr {
        "127.0.0.1:6881".parse().unwrap()
    }

    async fn recv_query(socket: &UdpSocket) -> KrpcMessage {
        let mut buf = [0u8; 1024];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("no datagram received")
            .unwrap();
        KrpcMessage::from_bytes(&buf[..len]).unwrap()
    }

    fn query_args(message: &KrpcMessage) -> (&bytes::Bytes, &bencode::Dict) {
        match message {
            KrpcMessage::Query {
                transaction_id,
                method,
                args,
            } => {
                assert_eq!(method, &QueryMethod::FindNode);
                (transaction_id, args)
            }
            other => panic!("expected query, got {:?}", other),
        }
    }

    #[test]
    fn test_seen_hashes_evicts_oldest() {
        let mut seen = SeenHashes::new(2);
        seen.insert([1; 20]);
        seen.insert([2; 20]);
        seen.insert([2; 20]);
        assert!(seen.contains(&[1; 20]));
        seen.insert([3; 20]);
        assert!(!seen.contains(&[1; 20]));
        assert!(seen.contains(&[2; 20]));
        assert!(seen.contains(&[3; 20]));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let store: Arc<dyn MagnetStore> = Arc::new(MemoryStore::new());
        let config = CrawlerConfig::default().with_seeds(Vec::<String>::new());
        assert!(CrawlNode::bind("SERVER0", config, 0, store).await.is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_queries_each_seed_once() {
        let mut seeds = Vec::new();
        let mut addrs = Vec::new();
        for _ in 0..3 {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            addrs.push(socket.local_addr().unwrap());
            seeds.push(socket);
        }

        let node = node_with(Arc::new(MemoryStore::new()), &addrs).await;
        assert_eq!(node.bootstrap().await, 3);

        let mut tids = HashSet::new();
        let mut targets = HashSet::new();
        for seed in &seeds {
            let message = recv_query(seed).await;
            let (tid, args) = query_args(&message);
            assert_eq!(tid.len(), 4);
            tids.insert(tid.clone());

            let id = args.get(&b"id"[..]).and_then(Value::as_bytes).unwrap();
            assert_eq!(id.as_ref(), node.identity().self_id.as_bytes());
            let target = args.get(&b"target"[..]).and_then(Value::as_bytes).unwrap();
            assert_eq!(target.len(), 20);
            targets.insert(target.clone());

            let mut buf = [0u8; 64];
            assert!(timeout(Duration::from_millis(100), seed.recv_from(&mut buf)).await.is_err());
        }
        assert_eq!(tids.len(), 3);
        assert_eq!(targets.len(), 3);
        assert_eq!(node.stats().queries_sent, 3);
    }

    #[tokio::test]
    async fn test_duplicate_get_peers_reaches_store_once() {
        let store = Arc::new(RecordingStore::default());
        let node = node_with(store.clone(), &[from_addr()]).await;
        let datagram = get_peers_query(&sequential_hash());

        let first = node.handle_datagram(&datagram, from_addr()).await.unwrap();
        let second = node.handle_datagram(&datagram, from_addr()).await.unwrap();

        let uri = "magnet:?xt=urn:btih:0102030405060708090A0B0C0D0E0F1011121314".to_string();
        assert_eq!(first, Handled::Magnet { uri: uri.clone(), forwarded: true });
        assert_eq!(second, Handled::Magnet { uri: uri.clone(), forwarded: false });
        assert_eq!(*store.adds.lock().unwrap(), vec![uri]);
        assert_eq!(node.stats().magnets, 1);
    }

    #[tokio::test]
    async fn test_failed_store_add_is_retried() {
        let store = Arc::new(RecordingStore::default());
        store.failing.store(1, Ordering::SeqCst);
        let node = node_with(store.clone(), &[from_addr()]).await;
        let datagram = get_peers_query(&sequential_hash());

        let err = node.handle_datagram(&datagram, from_addr()).await.unwrap_err();
        assert!(matches!(err, CrawlError::StoreError { .. }));
        assert!(store.adds.lock().unwrap().is_empty());
        assert_eq!(node.stats().magnets, 0);

        let retried = node.handle_datagram(&datagram, from_addr()).await.unwrap();
        assert!(matches!(retried, Handled::Magnet { forwarded: true, .. }));
        assert_eq!(store.adds.lock().unwrap().len(), 1);
        assert_eq!(node.stats().magnets, 1);
    }

    #[test]
    fn test_errors_are_counted_by_class() {
        let stats = CrawlStats::default();
        stats.record_error(&CrawlError::decode_error("bad"));
        stats.record_error(&CrawlError::transport_error("unreachable"));
        stats.record_error(&CrawlError::parse_error("bad torrent"));
        stats.record_error(&CrawlError::config_error("bad port"));

        assert_eq!(stats.decode_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.transport_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.other_errors.load(Ordering::Relaxed), 2);
        assert_eq!(stats.snapshot().errors, 4);
    }

    #[tokio::test]
    async fn test_short_info_hash_is_rejected() {
        let store = Arc::new(RecordingStore::default());
        let node = node_with(store.clone(), &[from_addr()]).await;

        let err = node.handle_datagram(&get_peers_query(&[1; 19]), from_addr()).await.unwrap_err();
        assert!(matches!(err, CrawlError::ValidationError { .. }));
        assert!(store.adds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_node_response_fills_table() {
        let node = node_with(Arc::new(MemoryStore::new()), &[from_addr()]).await;
        let peers = [
            PeerRef::new(NodeId::new([1; 20]), Ipv4Addr::new(10, 0, 0, 1), 6881),
            PeerRef::new(NodeId::new([2; 20]), Ipv4Addr::UNSPECIFIED, 6881),
            PeerRef::new(NodeId::new([3; 20]), Ipv4Addr::new(10, 0, 0, 3), 51413),
        ];

        let outcome = node.handle_datagram(&find_node_response(&peers), from_addr()).await.unwrap();
        assert_eq!(outcome, Handled::Nodes { added: 2, rejected: 1 });
        assert_eq!(node.table().len().await, 2);
        assert_eq!(node.table().pop().await, Some(peers[0]));
        assert_eq!(node.table().pop().await, Some(peers[2]));
    }

    #[tokio::test]
    async fn test_other_messages_are_ignored() {
        let node = node_with(Arc::new(MemoryStore::new()), &[from_addr()]).await;
        let ping = bencode::encode(&Value::dict([
            ("t", Value::string("aa")),
            ("y", Value::string("q")),
            ("q", Value::string("ping")),
            ("a", Value::dict([("id", Value::bytes(&[7; 20]))])),
        ]));
        let error = bencode::encode(&Value::dict([
            ("t", Value::string("aa")),
            ("y", Value::string("e")),
            ("e", Value::List(vec![Value::Integer(201), Value::string("Generic Error")])),
        ]));

        assert!(matches!(node.handle_datagram(&ping, from_addr()).await, Ok(Handled::Ignored(_))));
        assert!(matches!(node.handle_datagram(&error, from_addr()).await, Ok(Handled::Ignored(_))));
        assert!(node.table().is_empty().await);
    }

    #[tokio::test]
    async fn test_garbage_leaves_state_untouched() {
        let store = Arc::new(RecordingStore::default());
        let node = node_with(store.clone(), &[from_addr()]).await;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);

        for _ in 0..500 {
            let len = rng.gen_range(0..256);
            let mut data = vec![0u8; len];
            rng.fill(&mut data[..]);
            if rng.gen_bool(0.5) && !data.is_empty() {
                data[0] = b'd';
            }
            let _ = node.handle_datagram(&data, from_addr()).await;
        }

        assert!(node.table().is_empty().await);
        assert!(store.adds.lock().unwrap().is_empty());
        assert_eq!(node.stats().datagrams, 500);
    }

    #[tokio::test]
    async fn test_receive_once_over_loopback() {
        let store = Arc::new(MemoryStore::new());
        let node = node_with(store.clone(), &[from_addr()]).await;
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        peer.send_to(&get_peers_query(&[0xAB; 20]), node.local_addr()).await.unwrap();
        let mut buf = vec![0u8; 10_240];
        let outcome = timeout(Duration::from_secs(2), node.receive_once(&mut buf))
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(outcome, Handled::Magnet { forwarded: true, .. }));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_send_loop_impersonates_peer() {
        let seed = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let node = Arc::new(node_with(Arc::new(MemoryStore::new()), &[seed.local_addr().unwrap()]).await);

        let target_addr = match target.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            other => panic!("unexpected address {}", other),
        };
        let peer_id = NodeId::new([0x42; 20]);
        node.table().push(PeerRef::new(peer_id, *target_addr.ip(), target_addr.port())).await;

        let looping = Arc::clone(&node);
        let task = tokio::spawn(async move { looping.send_loop().await });

        let message = recv_query(&target).await;
        let (_, args) = query_args(&message);
        assert_eq!(args.get(&b"id"[..]).and_then(Value::as_bytes).unwrap().as_ref(), peer_id.as_bytes());

        // Table is now empty, so the loop falls back to the seed
        let message = recv_query(&seed).await;
        let (_, args) = query_args(&message);
        assert_eq!(
            args.get(&b"id"[..]).and_then(Value::as_bytes).unwrap().as_ref(),
            node.identity().self_id.as_bytes()
        );

        task.abort();
    }

    #[tokio::test]
    async fn test_run_crawlers_rejects_zero_count() {
        let store: Arc<dyn MagnetStore> = Arc::new(MemoryStore::new());
        assert!(run_crawlers(0, 10086, CrawlerConfig::default(), store).await.is_err());
    }

    #[tokio::test]
    async fn test_run_crawlers_rejects_port_overflow() {
        let store: Arc<dyn MagnetStore> = Arc::new(MemoryStore::new());
        let mut config = CrawlerConfig::default();
        config.bind_ip = Ipv4Addr::LOCALHOST.into();
        assert!(run_crawlers(3, u16::MAX, config, store).await.is_err());
    }
}
