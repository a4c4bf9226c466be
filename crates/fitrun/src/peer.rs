//! # Multiplexing Peer with Async Pump
//!
//! Adapts a duplex `Link` into a request-response `Transport`.
//!
//! A background pump task reads every inbound frame, extracts its sequence
//! number and completes the matching pending call. Callers never block a
//! thread on I/O: each call parks a oneshot continuation in the pending
//! table and the pump resolves it.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

use crate::transport;
use crate::transport::Link;
use crate::transport::Transport;

type Pending = DashMap<u64, oneshot::Sender<transport::Result<Vec<u8>>>>;

/// Removes a pending entry when the awaiting call goes away, whether it
/// completed, timed out or was cancelled.
struct PendingGuard<'a> {
    pending: &'a Pending,
    seq: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.seq);
    }
}

/// RPC peer over a single duplex link.
///
/// Sequence numbers are taken from the frames themselves, so they must be
/// unique among calls in flight on this peer.
pub struct Peer {
    peer_name: String,
    link: Arc<dyn Link>,
    pending: Arc<Pending>,
}

impl Peer {
    /// Creates a new peer and spawns the background pump task.
    /// The peer_name is used for logging and diagnostics.
    pub fn new(peer_name: impl Into<String>, link: Arc<dyn Link>) -> Self {
        let peer_name = peer_name.into();
        let pending: Arc<Pending> = Arc::new(DashMap::new());

        let pump_link = Arc::clone(&link);
        let pump_pending = Arc::clone(&pending);
        let pump_name = peer_name.clone();

        tokio::spawn(async move {
            let error = loop {
                match pump_link.recv().await {
                    Ok(Some(msg)) => Self::handle_message(&pump_name, &msg, &pump_pending),
                    Ok(None) => break transport::Error::ConnectionLost("Stream closed".into()),
                    Err(e) => {
                        warn!(peer = %pump_name, error = %e, "transport error in pump");
                        break e;
                    }
                }
            };

            Self::notify_all_pending(&pump_pending, error);
        });

        Self {
            peer_name,
            link,
            pending,
        }
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    /// Number of calls awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    fn handle_message(peer_name: &str, msg: &[u8], pending: &Pending) {
        let seq = match fitrpc::decode_seq(msg) {
            Ok(seq) => seq,
            Err(e) => {
                warn!(peer = %peer_name, error = %e, "dropping undecodable frame");
                return;
            }
        };

        // No pending request for this sequence: a late reply after a timeout.
        let Some((_, tx)) = pending.remove(&seq) else {
            debug!(peer = %peer_name, seq, "reply without pending call");
            return;
        };

        let _ = tx.send(Ok(msg.to_vec()));
    }

    fn notify_all_pending(pending: &Pending, error: transport::Error) {
        let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, tx)) = pending.remove(&key) {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for Peer {
    async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
        let seq = fitrpc::decode_seq(payload)
            .map_err(|e| transport::Error::Io(format!("unframed payload: {}", e)))?;

        let (tx, rx) = oneshot::channel();
        match self.pending.entry(seq) {
            Entry::Occupied(_) => {
                return Err(transport::Error::Io(format!("sequence {} already in flight", seq)));
            }
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        let _guard = PendingGuard { pending: &self.pending, seq };

        self.link.send(payload).await?;

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(transport::Error::ConnectionLost("Response channel closed".into())),
        }
    }
}
