//! # In-Memory Network
//!
//! An in-process `Connector` mapping worker ids to transports, plus a duplex
//! channel `Link`. Used to host several brokers in one process (tests, local
//! development, embedded deployments) without sockets.
//!
//! Workers can be severed and restored to simulate an unreachable process.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::target::Target;
use crate::transport;
use crate::transport::Connector;
use crate::transport::Link;
use crate::transport::Transport;

struct Node {
    transport: Arc<dyn Transport>,
    severed: AtomicBool,
}

/// Transport handed out by `MemoryNetwork`; checks reachability per call.
struct GatedTransport {
    worker_id: String,
    node: Arc<Node>,
}

#[async_trait::async_trait]
impl Transport for GatedTransport {
    async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
        if self.node.severed.load(Ordering::Acquire) {
            return Err(transport::Error::ConnectionLost(format!("worker {} severed", self.worker_id)));
        }
        self.node.transport.call(payload).await
    }
}

/// A registry of in-process workers reachable by worker id.
#[derive(Default)]
pub struct MemoryNetwork {
    nodes: DashMap<String, Arc<Node>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `transport` reachable as `worker_id`, replacing any previous node.
    pub fn attach(&self, worker_id: impl Into<String>, transport: Arc<dyn Transport>) {
        let node = Arc::new(Node {
            transport,
            severed: AtomicBool::new(false),
        });
        self.nodes.insert(worker_id.into(), node);
    }

    pub fn detach(&self, worker_id: &str) -> bool {
        self.nodes.remove(worker_id).is_some()
    }

    /// Every call to `worker_id` fails with a lost connection until restored.
    pub fn sever(&self, worker_id: &str) -> bool {
        self.set_severed(worker_id, true)
    }

    pub fn restore(&self, worker_id: &str) -> bool {
        self.set_severed(worker_id, false)
    }

    fn set_severed(&self, worker_id: &str, severed: bool) -> bool {
        match self.nodes.get(worker_id) {
            Some(node) => {
                node.severed.store(severed, Ordering::Release);
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl Connector for MemoryNetwork {
    async fn connect(&self, target: &Target) -> transport::Result<Arc<dyn Transport>> {
        let node = self
            .nodes
            .get(&target.worker_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| transport::Error::ConnectionLost(format!("no route to worker {}", target.worker_id)))?;

        Ok(Arc::new(GatedTransport {
            worker_id: target.worker_id.clone(),
            node,
        }))
    }
}

/// A duplex channel link using tokio mpsc channels.
///
/// Messages sent on one end appear on the other end's `recv` and vice versa.
pub struct DuplexChannel {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl DuplexChannel {
    /// Creates a pair of links connected to each other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: tx_a,
            rx: Mutex::new(rx_b),
        };

        let b = Self {
            tx: tx_b,
            rx: Mutex::new(rx_a),
        };

        (a, b)
    }
}

#[async_trait::async_trait]
impl Link for DuplexChannel {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        self.tx
            .send(payload.to_vec())
            .map_err(|_| transport::Error::ConnectionLost("Channel closed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}
