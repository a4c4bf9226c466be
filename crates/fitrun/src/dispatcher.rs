//! # Dispatcher
//!
//! The receiving side of a remote call: turns a request frame into a reply
//! frame by way of the filter chain and the broker's local executors.
//!
//! ## Invariants
//! - Every request gets exactly one reply, in the request's format, with
//!   the request's sequence number.
//! - Failures travel as exception envelopes naming the fitable that
//!   produced them.
//! - A frame that cannot be decoded is answered with a protocol violation
//!   under sequence `0`.
//! - A call reaching a draining executor is answered `UNAVAILABLE`, so the
//!   caller moves on to another target.

use std::sync::Arc;

use fitrpc::code;
use fitrpc::ExceptionEnvelope;
use fitrpc::Format;
use fitrpc::ReplyFrame;
use fitrpc::RequestFrame;
use fitrpc::RpcFrame;
use fitrpc::Value;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::broker::Broker;
use crate::context::CallContext;
use crate::context::Route;
use crate::error::Error;
use crate::error::Origin;
use crate::error::Result;
use crate::exception;
use crate::filter::Filter;
use crate::filter::FilterChain;
use crate::filter::Invocation;
use crate::identity::ImplId;
use crate::identity::ServiceId;
use crate::transport;
use crate::transport::Link;
use crate::transport::Transport;

pub struct Dispatcher {
    broker: Arc<Broker>,
    filters: FilterChain,
}

impl Dispatcher {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self {
            broker,
            filters: FilterChain::new(),
        }
    }

    /// Appends a filter; filters run in the order they were added.
    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub async fn handle(&self, payload: &[u8]) -> Vec<u8> {
        let (format, request) = match RpcFrame::decode(payload) {
            Ok((format, RpcFrame::Request(request))) => (format, request),
            Ok((format, RpcFrame::Reply(reply))) => {
                warn!(seq = reply.seq, "dispatcher received a reply frame");
                return self.violation(&format, reply.seq, "expected a request frame".into());
            }
            Err(e) => {
                let format = fitrpc::peek_format(payload).unwrap_or_else(|_| self.broker.default_format());
                warn!(error = %e, "undecodable request");
                return self.violation(&format, 0, e.to_string());
            }
        };

        let seq = request.seq;
        let reply = match self.process(&format, request).await {
            Ok((origin, value)) => ReplyFrame::ok(seq, &format, &value)
                .unwrap_or_else(|e| ReplyFrame::failure(seq, exception::to_envelope(&Error::from(e), &origin))),
            Err((origin, error)) => {
                debug!(seq, origin = %origin, error = %error, "call failed");
                ReplyFrame::failure(seq, exception::to_envelope(&error, &origin))
            }
        };

        encode_reply(&format, reply)
    }

    /// Spawns a task answering every request arriving on `link`, each on
    /// its own task. The task ends when the link closes.
    pub fn serve(self: Arc<Self>, link: Arc<dyn Link>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match link.recv().await {
                    Ok(Some(frame)) => {
                        let dispatcher = Arc::clone(&self);
                        let link = Arc::clone(&link);
                        tokio::spawn(async move {
                            let reply = dispatcher.handle(&frame).await;
                            if let Err(e) = link.send(&reply).await {
                                warn!(error = %e, "failed to send reply");
                            }
                        });
                    }
                    Ok(None) => {
                        debug!("link closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "link failed");
                        break;
                    }
                }
            }
        })
    }

    async fn process(
        &self,
        format: &Format,
        request: RequestFrame,
    ) -> std::result::Result<(Origin, Value), (Origin, Error)> {
        let fallback = Origin::new(
            format!("{}@{}", request.service_id, request.service_version),
            match (&request.impl_id, &request.impl_version) {
                (Some(id), Some(version)) => format!("{}@{}", id, version),
                (Some(id), None) => id.clone(),
                (None, _) => String::new(),
            },
        );

        let impl_id = self.resolve(&request).map_err(|e| (fallback, e))?;
        let origin = Origin::of(&impl_id);

        let args = match request.decode_args(format) {
            Ok(args) => args,
            Err(e) => return Err((origin, e.into())),
        };

        let invocation = Invocation {
            impl_id,
            context: CallContext::new().with_attributes(request.attributes),
            args,
        };

        let broker = Arc::clone(&self.broker);
        let terminal = move |invocation: Invocation| {
            let broker = Arc::clone(&broker);
            async move {
                let executors = broker.executors();
                match executors.acquire(&invocation.impl_id) {
                    Some(lease) => lease.invoke(invocation.context, invocation.args).await,
                    None if executors.is_draining(&invocation.impl_id) => Err(Error::Unavailable {
                        fitable: invocation.impl_id.to_string(),
                        origin: None,
                    }),
                    None => Err(Error::not_found(format!("local executor {}", invocation.impl_id))),
                }
            }
            .boxed()
        };

        match self.filters.run(invocation, &terminal).await {
            Ok(value) => Ok((origin, value)),
            Err(e) => Err((origin, e)),
        }
    }

    /// Explicit fitable first, otherwise whatever this broker would route to.
    fn resolve(&self, request: &RequestFrame) -> Result<ImplId> {
        let service = ServiceId::new(request.service_id.clone(), request.service_version.clone())?;

        if let (Some(id), Some(version)) = (&request.impl_id, &request.impl_version) {
            return Ok(ImplId::new(service, id.clone(), version.clone())?);
        }

        let genericable = self.broker.repository().get(&service)?;
        let fitable = match &request.impl_id {
            Some(id) => genericable.resolve_pinned(&Route::new(id.clone(), None))?,
            None => genericable.resolve(&CallContext::new(), self.broker.router())?,
        };
        Ok(fitable.id().clone())
    }

    fn violation(&self, format: &Format, seq: u64, message: String) -> Vec<u8> {
        let envelope = ExceptionEnvelope::system(
            String::new(),
            self.broker.config().worker_id.clone(),
            code::PROTOCOL_VIOLATION,
            message,
        );
        encode_reply(format, ReplyFrame::failure(seq, envelope))
    }
}

fn encode_reply(format: &Format, reply: ReplyFrame) -> Vec<u8> {
    let seq = reply.seq;
    match RpcFrame::Reply(reply).encode(format) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(seq, error = %e, "cannot encode reply");
            let envelope = ExceptionEnvelope::system(String::new(), String::new(), code::INTERNAL, e.to_string());
            RpcFrame::Reply(ReplyFrame::failure(seq, envelope))
                .encode(format)
                .unwrap_or_default()
        }
    }
}

#[async_trait::async_trait]
impl Transport for Dispatcher {
    async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
        Ok(self.handle(payload).await)
    }
}
