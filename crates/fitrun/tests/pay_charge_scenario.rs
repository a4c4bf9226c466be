//! `pay.charge@1.0.0` end to end: a default fitable spread over two remote
//! targets, one of which dies halfway through, plus a local-only fitable.

mod common;

use std::sync::Arc;

use fitrun::memory::MemoryNetwork;
use fitrun::BrokerConfig;
use fitrun::Error;
use fitrun::FitableBuilder;
use fitrun::GenericableBuilder;
use fitrun::Invoker;
use fitrun::LocalExecutor;
use fitrun::ServiceId;
use fitrun::Value;

use common::Worker;
use common::ENV;

async fn burst(invoker: &Invoker, calls: usize) -> Vec<Result<Value, Error>> {
    let tasks: Vec<_> = (0..calls)
        .map(|i| {
            let invoker = invoker.clone();
            tokio::spawn(async move { invoker.call(vec![Value::from(i as u64)]).await })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(calls);
    for task in futures::future::join_all(tasks).await {
        outcomes.push(task.expect("call task panicked"));
    }
    outcomes
}

fn assert_no_config_errors(outcomes: &[Result<Value, Error>]) {
    for outcome in outcomes {
        if let Err(e) = outcome {
            assert!(!e.is_not_found(), "unexpected NotFound: {}", e);
            assert!(!matches!(e, Error::NoCompatibleFormat { .. }), "unexpected {}", e);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pay_charge_failover() {
    common::init_tracing();

    let network = Arc::new(MemoryNetwork::new());
    let f1 = common::impl_id("pay.charge", "1.0.0", "F1");
    let f2 = common::impl_id("pay.charge", "1.0.0", "F2");
    let t1 = Worker::spawn(&network, "T1", ENV, &[f1.clone()]);
    let t2 = Worker::spawn(&network, "T2", ENV, &[f1]);

    let client = common::client(network.clone(), BrokerConfig::new("client", ENV));
    client
        .register_genericable(
            GenericableBuilder::new(ServiceId::new("pay.charge", "1.0.0").unwrap())
                .fitable(FitableBuilder::new("F1", "1").target(t1.target()).target(t2.target()))
                .fitable(FitableBuilder::new("F2", "1"))
                .default_fitable("F1", "1"),
        )
        .unwrap();
    client
        .register_executor(LocalExecutor::new(f2, |_ctx, _args| async move { Ok(Value::from("local")) }))
        .unwrap();

    let invoker = client.invoker("pay.charge", "1.0.0").unwrap();

    // Calls 1..=50: both targets healthy.
    let first = burst(&invoker, 50).await;
    assert_no_config_errors(&first);
    assert!(first.iter().all(Result::is_ok));
    assert_eq!(t1.hits(), 25);
    assert_eq!(t2.hits(), 25);

    // Calls 51..=100: T1 is gone, every call lands on T2.
    network.sever("T1");
    let second = burst(&invoker, 50).await;
    assert_no_config_errors(&second);
    assert!(second.iter().all(|r| matches!(r, Ok(v) if *v == Value::from("T2"))));
    assert_eq!(t1.hits(), 25);
    assert_eq!(t2.hits(), 75);

    // The local-only fitable never touches the network.
    let local = invoker.clone().route("F2", Some("1")).call(vec![]).await.unwrap();
    assert_eq!(local, Value::from("local"));
    assert_eq!(t1.hits() + t2.hits(), 100);
}
