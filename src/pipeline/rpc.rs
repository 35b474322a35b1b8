//! Sub-protocol delegation.
//!
//! Requests whose path is the RPC prefix or lies below it are handed to the
//! [`RpcHandler`] instead of the route table. The handler owns the response:
//! it is marked [`Delegated`] so that no stage reinterprets it on the way back.
//! Without a handler every request passes through to normal dispatch.

use super::{Chain, Stage};
use crate::{BoxResponseFuture, RpcHandler};

use {axum::extract::Request, std::sync::Arc};

/// Response extension marking a response produced by the [`RpcHandler`].
#[derive(Debug, Clone, Copy)]
pub struct Delegated;

pub struct RpcDelegation {
    prefix: String,
    handler: Option<Arc<dyn RpcHandler>>,
}

impl RpcDelegation {
    pub fn new(prefix: impl Into<String>, handler: Option<Arc<dyn RpcHandler>>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            handler,
        }
    }

    /// Whether `path` is the prefix itself or below it (segment-wise).
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix.is_empty() {
            return true;
        }
        path.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

impl Stage for RpcDelegation {
    fn name(&self) -> &'static str {
        "rpc"
    }

    fn handle(&self, req: Request, next: Chain) -> BoxResponseFuture {
        let handler = match &self.handler {
            Some(handler) if self.matches(req.uri().path()) => handler.clone(),
            _ => return next.run(req),
        };

        tracing::debug!(path = %req.uri().path(), "Delegating to RPC handler");
        Box::pin(async move {
            let mut response = handler.handle(req).await;
            response.extensions_mut().insert(Delegated);
            response
        })
    }
}
