//! # Server-Side Filters
//!
//! An ordered chain wrapped around the local executor on the receiving side.
//!
//! Each filter gets the invocation and a `Next` handle. It may inspect or
//! rewrite the invocation and call `next.run(..)`, return its own value
//! without calling further, or fail. A failure aborts the chain and becomes
//! the reply.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::CallContext;
use crate::error::Result;
use crate::identity::ImplId;
use fitrpc::Value;

/// A call as seen by filters.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub impl_id: ImplId,
    pub context: CallContext,
    pub args: Vec<Value>,
}

pub type Terminal = dyn Fn(Invocation) -> BoxFuture<'static, Result<Value>> + Send + Sync;

#[async_trait::async_trait]
pub trait Filter: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn filter(&self, invocation: Invocation, next: Next<'_>) -> Result<Value>;
}

/// The remainder of the chain after the current filter.
pub struct Next<'a> {
    filters: &'a [Arc<dyn Filter>],
    terminal: &'a Terminal,
}

impl Next<'_> {
    pub async fn run(self, invocation: Invocation) -> Result<Value> {
        match self.filters.split_first() {
            Some((filter, rest)) => {
                let next = Next {
                    filters: rest,
                    terminal: self.terminal,
                };
                filter.filter(invocation, next).await
            }
            None => (self.terminal)(invocation).await,
        }
    }
}

#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter; filters run in the order they were pushed.
    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub async fn run(&self, invocation: Invocation, terminal: &Terminal) -> Result<Value> {
        Next {
            filters: &self.filters,
            terminal,
        }
        .run(invocation)
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::FutureExt;

    use super::*;
    use crate::error::Error;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl Filter for Record {
        fn name(&self) -> &str {
            self.name
        }

        async fn filter(&self, invocation: Invocation, next: Next<'_>) -> Result<Value> {
            self.log.lock().unwrap().push(format!("{}:before", self.name));
            let out = next.run(invocation).await;
            self.log.lock().unwrap().push(format!("{}:after", self.name));
            out
        }
    }

    struct Deny;

    #[async_trait::async_trait]
    impl Filter for Deny {
        fn name(&self) -> &str {
            "deny"
        }

        async fn filter(&self, invocation: Invocation, next: Next<'_>) -> Result<Value> {
            if invocation.context.attribute("token").is_none() {
                return Err(Error::rejected("missing token"));
            }
            next.run(invocation).await
        }
    }

    struct Cached;

    #[async_trait::async_trait]
    impl Filter for Cached {
        fn name(&self) -> &str {
            "cached"
        }

        async fn filter(&self, _invocation: Invocation, _next: Next<'_>) -> Result<Value> {
            Ok(Value::from("cached"))
        }
    }

    fn invocation(ctx: CallContext) -> Invocation {
        Invocation {
            impl_id: ImplId::parts("s", "1", "f", "1").unwrap(),
            context: ctx,
            args: vec![Value::from(7i64)],
        }
    }

    fn terminal() -> Box<Terminal> {
        Box::new(|invocation: Invocation| {
            async move { Ok(invocation.args.into_iter().next().unwrap_or_default()) }.boxed()
        })
    }

    #[tokio::test]
    async fn test_filters_wrap_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain.push(Arc::new(Record { name: "a", log: Arc::clone(&log) }));
        chain.push(Arc::new(Record { name: "b", log: Arc::clone(&log) }));

        let out = chain.run(invocation(CallContext::new()), terminal().as_ref()).await.unwrap();
        assert_eq!(out, Value::from(7i64));
        assert_eq!(*log.lock().unwrap(), vec!["a:before", "b:before", "b:after", "a:after"]);
        assert_eq!(chain.names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_rejection_aborts_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain.push(Arc::new(Deny));
        chain.push(Arc::new(Record { name: "inner", log: Arc::clone(&log) }));

        let err = chain.run(invocation(CallContext::new()), terminal().as_ref()).await.unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));
        assert!(log.lock().unwrap().is_empty());

        let ctx = CallContext::new().with_attribute("token", "t");
        assert!(chain.run(invocation(ctx), terminal().as_ref()).await.is_ok());
    }

    #[tokio::test]
    async fn test_short_circuit() {
        let mut chain = FilterChain::new();
        chain.push(Arc::new(Cached));
        let out = chain.run(invocation(CallContext::new()), terminal().as_ref()).await.unwrap();
        assert_eq!(out, Value::from("cached"));
    }
}
