//! # FitRun
//!
//! Resolves a call to a genericable into one fitable and runs it: in
//! process through a local executor when one is bound, otherwise on a
//! remote target picked by the load balancer, degrading to a fallback
//! fitable when the chosen one cannot be reached.

pub mod balancer;
pub mod broker;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod exception;
pub mod executor;
pub mod filter;
pub mod genericable;
pub mod identity;
pub mod invoker;
pub mod locator;
pub mod manifest;
pub mod memory;
pub mod metadata;
pub mod peer;
pub mod repository;
pub mod router;
pub mod target;
pub mod transport;

pub use fitrpc::Format;
pub use fitrpc::Value;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use context::CallContext;
pub use dispatcher::Dispatcher;
pub use error::BusinessError;
pub use error::Error;
pub use error::Result;
pub use executor::LocalExecutor;
pub use genericable::FitableBuilder;
pub use genericable::GenericableBuilder;
pub use identity::ImplId;
pub use identity::ServiceId;
pub use invoker::CallHandle;
pub use invoker::CommunicationMode;
pub use invoker::Invoker;
pub use manifest::Manifest;
pub use target::Endpoint;
pub use target::Target;
