//! Shared fixtures: in-process workers reachable over a `MemoryNetwork`.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use fitrun::dispatcher::Dispatcher;
use fitrun::memory::MemoryNetwork;
use fitrun::target::Target;
use fitrun::transport;
use fitrun::transport::Connector;
use fitrun::transport::Transport;
use fitrun::Broker;
use fitrun::BrokerConfig;
use fitrun::ImplId;
use fitrun::LocalExecutor;
use fitrun::Value;

pub const ENV: &str = "prod";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn impl_id(service: &str, version: &str, id: &str) -> ImplId {
    ImplId::parts(service, version, id, "1").unwrap()
}

pub fn client(network: Arc<dyn Connector>, config: BrokerConfig) -> Arc<Broker> {
    Broker::new(config, network).unwrap()
}

/// A remote worker serving `fitables`. Each call increments `hits` and
/// answers with the worker id.
pub struct Worker {
    pub broker: Arc<Broker>,
    pub hits: Arc<AtomicUsize>,
}

impl Worker {
    pub fn spawn(network: &Arc<MemoryNetwork>, worker_id: &str, environment: &str, fitables: &[ImplId]) -> Self {
        Self::spawn_with(network, BrokerConfig::new(worker_id, environment), fitables)
    }

    pub fn spawn_with(network: &Arc<MemoryNetwork>, config: BrokerConfig, fitables: &[ImplId]) -> Self {
        let worker_id = config.worker_id.clone();
        let broker = Broker::new(config, Arc::clone(network) as Arc<dyn Connector>).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        for impl_id in fitables {
            let hits = Arc::clone(&hits);
            let name = worker_id.clone();
            let executor = LocalExecutor::new(impl_id.clone(), move |_ctx, _args| {
                hits.fetch_add(1, Ordering::SeqCst);
                let name = name.clone();
                async move { Ok(Value::from(name)) }
            })
            .micro(true);
            broker.register_executor(executor).unwrap();
        }

        network.attach(worker_id, Arc::new(Dispatcher::new(Arc::clone(&broker))));
        Self { broker, hits }
    }

    pub fn target(&self) -> Target {
        self.broker.local_target()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Tells `client` what this worker serves.
    pub fn announce_to(&self, client: &Broker) {
        client
            .announce(self.broker.local_target(), self.broker.local_fitables())
            .unwrap();
    }
}

/// Counts connection attempts before handing them to the wrapped network.
pub struct CountingConnector {
    pub inner: Arc<MemoryNetwork>,
    pub connects: AtomicUsize,
}

impl CountingConnector {
    pub fn new(inner: Arc<MemoryNetwork>) -> Self {
        Self {
            inner,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, target: &Target) -> transport::Result<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(target).await
    }
}
