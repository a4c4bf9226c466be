//! Unregistering a fitable drains the calls already running on it.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use fitrun::memory::MemoryNetwork;
use fitrun::BrokerConfig;
use fitrun::CommunicationMode;
use fitrun::Error;
use fitrun::FitableBuilder;
use fitrun::GenericableBuilder;
use fitrun::LocalExecutor;
use fitrun::Manifest;
use fitrun::ServiceId;
use fitrun::Value;

use common::ENV;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unload_waits_for_in_flight_calls() {
    let network = Arc::new(MemoryNetwork::new());
    let broker = common::client(network, BrokerConfig::new("host", ENV));
    let report = common::impl_id("report.build", "2", "pdf");

    let gate = Arc::new(Notify::new());
    let executor = {
        let gate = Arc::clone(&gate);
        LocalExecutor::new(report.clone(), move |_ctx, _args| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok(Value::from("report.pdf"))
            }
        })
    };

    broker
        .load(
            Manifest::new("reports")
                .genericable(
                    GenericableBuilder::new(ServiceId::new("report.build", "2").unwrap())
                        .fitable(FitableBuilder::new("pdf", "1"))
                        .default_fitable("pdf", "1"),
                )
                .executor(executor),
        )
        .await
        .unwrap();

    let invoker = broker
        .invoker("report.build", "2")
        .unwrap()
        .mode(CommunicationMode::Async);
    let running = invoker.invoke(vec![]);

    while broker.executors().in_flight(&report) == 0 {
        tokio::task::yield_now().await;
    }

    let unloading = {
        let broker = Arc::clone(&broker);
        tokio::spawn(async move { broker.unload("reports").await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!unloading.is_finished(), "unload must wait for the running call");

    // Draining executors accept no new calls.
    let rejected = invoker.call(vec![]).await.unwrap_err();
    assert!(matches!(rejected, Error::Unreachable { .. }), "got {}", rejected);

    gate.notify_one();
    assert_eq!(running.await.unwrap(), Value::from("report.pdf"));
    unloading.await.unwrap().unwrap();

    assert!(broker.genericable("report.build", "2").unwrap_err().is_not_found());
    assert!(!broker.executors().contains(&report));
    assert!(invoker.call(vec![]).await.unwrap_err().is_not_found());
}
