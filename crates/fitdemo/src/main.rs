//! Spins up two in-process pay workers, a client configured from TOML, and
//! drives `pay.charge@1.0.0` through balancing, failover and a route
//! override.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use fitrun::memory::MemoryNetwork;
use fitrun::transport::Connector;
use fitrun::Broker;
use fitrun::BrokerConfig;
use fitrun::BusinessError;
use fitrun::Dispatcher;
use fitrun::Error;
use fitrun::FitableBuilder;
use fitrun::GenericableBuilder;
use fitrun::ImplId;
use fitrun::LocalExecutor;
use fitrun::ServiceId;
use fitrun::Value;

const CLIENT: &str = r#"
worker_id = "checkout"
environment = "prod"
formats = ["bincode", "json"]
strategy = "round-robin"
call_timeout_ms = 2000

[[workers]]
worker_id = "pay-east"
host = "10.0.0.1"
environment = "prod"
formats = ["bincode"]
fitables = [{ service = "pay.charge", service_version = "1.0.0", fitable = "card", fitable_version = "1" }]

[[workers]]
worker_id = "pay-west"
host = "10.0.0.2"
environment = "prod"
formats = ["json"]
fitables = [{ service = "pay.charge", service_version = "1.0.0", fitable = "card", fitable_version = "1" }]
"#;

fn card() -> anyhow::Result<ImplId> {
    Ok(ImplId::parts("pay.charge", "1.0.0", "card", "1")?)
}

/// A pay worker that charges by card and refuses non-positive amounts.
fn spawn_worker(network: &Arc<MemoryNetwork>, worker_id: &str, format: &str) -> anyhow::Result<Arc<Broker>> {
    let config = BrokerConfig::new(worker_id, "prod").with_formats([format]);
    let broker = Broker::new(config, Arc::clone(network) as Arc<dyn Connector>)?;

    let name = worker_id.to_string();
    let executor = LocalExecutor::new(card()?, move |_ctx, args| {
        let name = name.clone();
        async move {
            let amount = args.first().and_then(Value::as_s64).unwrap_or(0);
            if amount <= 0 {
                return Err(Error::Business(
                    BusinessError::new(4001, "amount must be positive").with_property("amount", amount.to_string()),
                ));
            }
            Ok(Value::from(format!("{} charged {}", name, amount)))
        }
    })
    .micro(true);
    broker.register_executor(executor)?;

    network.attach(worker_id, Arc::new(Dispatcher::new(Arc::clone(&broker))));
    Ok(broker)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let network = Arc::new(MemoryNetwork::new());
    spawn_worker(&network, "pay-east", "bincode")?;
    spawn_worker(&network, "pay-west", "json")?;

    let config = BrokerConfig::from_toml_str(CLIENT).context("parsing client config")?;
    let client = Broker::new(config, Arc::clone(&network) as Arc<dyn Connector>)?;
    client.register_genericable(
        GenericableBuilder::new(ServiceId::new("pay.charge", "1.0.0")?)
            .fitable(FitableBuilder::new("card", "1").degradation("cash", "1"))
            .fitable(FitableBuilder::new("cash", "1"))
            .default_fitable("card", "1"),
    )?;
    client.register_executor(LocalExecutor::new(
        ImplId::parts("pay.charge", "1.0.0", "cash", "1")?,
        |_ctx, _args| async move { Ok(Value::from("checkout took cash")) },
    ))?;

    let invoker = client.invoker("pay.charge", "1.0.0")?;

    for amount in 1..=4i64 {
        let out = invoker.call(vec![Value::from(amount)]).await?;
        info!(?out, "balanced");
    }

    match invoker.call(vec![Value::from(-1i64)]).await {
        Err(Error::Business(e)) => warn!(code = e.code, message = %e.message, origin = ?e.origin, "rejected"),
        other => anyhow::bail!("expected a business rejection, got {:?}", other),
    }

    network.sever("pay-east");
    for amount in 5..=6i64 {
        let out = invoker.call(vec![Value::from(amount)]).await?;
        info!(?out, "pay-east severed");
    }

    network.sever("pay-west");
    let out = invoker.call(vec![Value::from(7i64)]).await?;
    info!(?out, "degraded");

    client.router().set_route(ImplId::parts("pay.charge", "1.0.0", "cash", "1")?);
    network.restore("pay-east");
    let out = invoker.call(vec![Value::from(8i64)]).await?;
    info!(?out, revision = client.router().revision(), "routed by override");

    Ok(())
}
