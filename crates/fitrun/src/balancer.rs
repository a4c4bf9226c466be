//! # Load Balancing
//!
//! Picks one target per attempt and drives the remote call, retrying on the
//! remaining targets when one cannot be reached.
//!
//! ## Invariants
//! - Targets sharing no format with this process are dropped before any
//!   attempt. If none remain the call fails with `NoCompatibleFormat`.
//! - A target that fails at the transport level is removed for the rest of
//!   the call. Business failures return immediately.
//! - Round-robin state is one atomic counter per fitable; calls to different
//!   fitables never contend.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use fitrpc::Format;
use fitrpc::RequestFrame;
use fitrpc::RpcFrame;
use fitrpc::Value;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::context::CallContext;
use crate::error::Error;
use crate::error::Result;
use crate::genericable::Fitable;
use crate::identity::ImplId;
use crate::target::Target;
use crate::transport;
use crate::transport::Connector;

/// A target together with the format negotiated for it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub target: Target,
    pub format: Format,
}

/// Chooses among the candidates of one attempt.
pub trait Strategy: Send + Sync + 'static {
    /// Returns an index into `candidates`, which is never empty.
    fn select(&self, key: &ImplId, candidates: &[Candidate]) -> usize;

    fn name(&self) -> &'static str;
}

#[derive(Default)]
pub struct RoundRobin {
    counters: DashMap<ImplId, Arc<AtomicUsize>>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, key: &ImplId) -> Arc<AtomicUsize> {
        if let Some(counter) = self.counters.get(key) {
            return Arc::clone(counter.value());
        }
        Arc::clone(self.counters.entry(key.clone()).or_default().value())
    }
}

impl Strategy for RoundRobin {
    fn select(&self, key: &ImplId, candidates: &[Candidate]) -> usize {
        self.counter(key).fetch_add(1, Ordering::Relaxed) % candidates.len()
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

#[derive(Default)]
pub struct Random;

impl Strategy for Random {
    fn select(&self, _key: &ImplId, candidates: &[Candidate]) -> usize {
        rand::thread_rng().gen_range(0..candidates.len())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    Random,
}

impl StrategyKind {
    pub fn build(self) -> Arc<dyn Strategy> {
        match self {
            Self::RoundRobin => Arc::new(RoundRobin::new()),
            Self::Random => Arc::new(Random),
        }
    }
}

pub struct LoadBalancer {
    strategy: Arc<dyn Strategy>,
    connector: Arc<dyn Connector>,
    /// Formats this process produces, most preferred first.
    formats: Vec<Format>,
    request_timeout: Duration,
    seq: AtomicU64,
}

impl LoadBalancer {
    pub fn new(
        strategy: Arc<dyn Strategy>,
        connector: Arc<dyn Connector>,
        formats: Vec<Format>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            strategy,
            connector,
            formats,
            request_timeout,
            seq: AtomicU64::new(1),
        }
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    /// Keeps the targets this process can talk to, each with its negotiated format.
    pub fn candidates(&self, targets: Vec<Target>) -> Vec<Candidate> {
        targets
            .into_iter()
            .filter_map(|target| {
                let format = target.negotiate(&self.formats)?;
                Some(Candidate { target, format })
            })
            .collect()
    }

    pub async fn invoke(
        &self,
        fitable: &Fitable,
        targets: Vec<Target>,
        ctx: &CallContext,
        args: &[Value],
    ) -> Result<Value> {
        if targets.is_empty() {
            return Err(Error::unreachable(fitable.id(), "no targets"));
        }

        let mut candidates = self.candidates(targets);
        if candidates.is_empty() {
            return Err(Error::NoCompatibleFormat { fitable: fitable.id().to_string() });
        }

        let mut attempts = 0;
        while !candidates.is_empty() {
            let index = self.strategy.select(fitable.id(), &candidates).min(candidates.len() - 1);
            attempts += 1;

            match self.attempt(fitable.id(), &candidates[index], ctx, args).await {
                Err(e) if e.is_transport() => {
                    let failed = candidates.remove(index);
                    warn!(
                        fitable = %fitable.id(),
                        worker = %failed.target.worker_id,
                        remaining = candidates.len(),
                        error = %e,
                        "target failed, retrying"
                    );
                }
                outcome => return outcome,
            }
        }

        Err(Error::AllTargetsUnreachable {
            fitable: fitable.id().to_string(),
            attempts,
        })
    }

    async fn attempt(&self, impl_id: &ImplId, candidate: &Candidate, ctx: &CallContext, args: &[Value]) -> Result<Value> {
        let target = &candidate.target;
        let format = &candidate.format;

        let transport = self
            .connector
            .connect(target)
            .await
            .map_err(|e| Error::unreachable(target, e.to_string()))?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let request = RequestFrame::new(seq, impl_id.service().id(), impl_id.service().version())
            .with_impl(impl_id.id(), Some(impl_id.version().to_string()))
            .with_attributes(ctx.attributes().clone())
            .with_args(format, args)?;
        let payload = RpcFrame::Request(request).encode(format)?;

        debug!(fitable = %impl_id, worker = %target.worker_id, seq, format = %format, "remote attempt");
        let bytes = match tokio::time::timeout(self.request_timeout, transport.call(&payload)).await {
            Err(_) | Ok(Err(transport::Error::Timeout)) => return Err(Error::timeout(target)),
            Ok(Err(e)) => return Err(Error::unreachable(target, e.to_string())),
            Ok(Ok(bytes)) => bytes,
        };

        let (reply_format, frame) = RpcFrame::decode(&bytes)?;
        let RpcFrame::Reply(reply) = frame else {
            return Err(fitrpc::Error::ProtocolViolation(format!("{} answered with a request", target)).into());
        };
        if reply.seq != seq {
            return Err(fitrpc::Error::ProtocolViolation(format!(
                "{} answered sequence {} to request {}",
                target, reply.seq, seq
            ))
            .into());
        }

        match reply.into_status(&reply_format)? {
            Ok(value) => Ok(value),
            Err(envelope) => Err(envelope.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use fitrpc::ReplyFrame;

    use super::*;
    use crate::genericable::FitableBuilder;
    use crate::genericable::GenericableBuilder;
    use crate::identity::ServiceId;
    use crate::memory::MemoryNetwork;
    use crate::transport::Transport;

    /// Answers every request with its own worker id.
    struct Responder(&'static str);

    #[async_trait::async_trait]
    impl Transport for Responder {
        async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
            let (format, frame) = RpcFrame::decode(payload).map_err(|e| transport::Error::Io(e.to_string()))?;
            let reply = ReplyFrame::ok(frame.seq(), &format, &Value::from(self.0))
                .map_err(|e| transport::Error::Io(e.to_string()))?;
            RpcFrame::Reply(reply)
                .encode(&format)
                .map_err(|e| transport::Error::Io(e.to_string()))
        }
    }

    fn fitable() -> Arc<Fitable> {
        let genericable = GenericableBuilder::new(ServiceId::new("echo", "1").unwrap())
            .fitable(FitableBuilder::new("remote", "1"))
            .build()
            .unwrap();
        genericable.fitable("remote", "1").unwrap()
    }

    fn target(worker: &str, format: Format) -> Target {
        Target::new(worker, "h", "test").with_format(format)
    }

    fn balancer(network: Arc<MemoryNetwork>) -> LoadBalancer {
        LoadBalancer::new(
            StrategyKind::RoundRobin.build(),
            network,
            vec![Format::BINCODE, Format::JSON],
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_round_robin_rotates_per_key() {
        let rr = RoundRobin::new();
        let a = ImplId::parts("s", "1", "a", "1").unwrap();
        let b = ImplId::parts("s", "1", "b", "1").unwrap();
        let candidates = vec![
            Candidate { target: target("w1", Format::JSON), format: Format::JSON },
            Candidate { target: target("w2", Format::JSON), format: Format::JSON },
            Candidate { target: target("w3", Format::JSON), format: Format::JSON },
        ];

        let picks: Vec<usize> = (0..6).map(|_| rr.select(&a, &candidates)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(rr.select(&b, &candidates), 0);
    }

    #[test]
    fn test_random_stays_in_bounds() {
        let key = ImplId::parts("s", "1", "a", "1").unwrap();
        let candidates = vec![
            Candidate { target: target("w1", Format::JSON), format: Format::JSON },
            Candidate { target: target("w2", Format::JSON), format: Format::JSON },
        ];
        for _ in 0..100 {
            assert!(Random.select(&key, &candidates) < 2);
        }
    }

    #[test]
    fn test_strategy_kind_names() {
        assert_eq!(StrategyKind::default().build().name(), "round-robin");
        assert_eq!(StrategyKind::Random.build().name(), "random");
    }

    #[tokio::test]
    async fn test_no_compatible_format() {
        let network = Arc::new(MemoryNetwork::new());
        let lb = LoadBalancer::new(
            StrategyKind::RoundRobin.build(),
            network,
            vec![Format::BINCODE],
            Duration::from_millis(200),
        );

        let err = lb
            .invoke(&fitable(), vec![target("w1", Format::JSON)], &CallContext::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoCompatibleFormat { .. }));
    }

    #[tokio::test]
    async fn test_negotiates_per_target() {
        let network = Arc::new(MemoryNetwork::new());
        network.attach("w1", Arc::new(Responder("w1")));
        let lb = balancer(Arc::clone(&network));

        let out = lb
            .invoke(&fitable(), vec![target("w1", Format::JSON)], &CallContext::new(), &[Value::from(1i64)])
            .await
            .unwrap();
        assert_eq!(out, Value::from("w1"));
    }

    #[tokio::test]
    async fn test_retries_on_unreachable_target() {
        let network = Arc::new(MemoryNetwork::new());
        network.attach("w1", Arc::new(Responder("w1")));
        network.attach("w2", Arc::new(Responder("w2")));
        network.sever("w1");
        let lb = balancer(Arc::clone(&network));
        let fitable = fitable();

        for _ in 0..4 {
            let out = lb
                .invoke(
                    &fitable,
                    vec![target("w1", Format::BINCODE), target("w2", Format::BINCODE)],
                    &CallContext::new(),
                    &[],
                )
                .await
                .unwrap();
            assert_eq!(out, Value::from("w2"));
        }
    }

    #[tokio::test]
    async fn test_all_targets_unreachable() {
        let network = Arc::new(MemoryNetwork::new());
        let lb = balancer(network);

        let err = lb
            .invoke(
                &fitable(),
                vec![target("w1", Format::JSON), target("w2", Format::BINCODE)],
                &CallContext::new(),
                &[],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllTargetsUnreachable { attempts: 2, .. }));
        assert!(err.is_transport());
    }
}
