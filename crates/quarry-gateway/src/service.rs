//! Tower `Service` facade over the connection manager.
//!
//! The outer protocol server is out of scope, but whatever it is, it can
//! stack standard middleware on this service.

use crate::manager::ConnectionManager;
use futures::future::BoxFuture;
use quarry_core::{AccessError, ExecuteOptions, QueryRows};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// One dispatch request: a template name, its positional parameters, and
/// the per-call options.
#[derive(Debug, Clone, Default)]
pub struct TemplateRequest {
    pub template: String,
    pub params: Vec<serde_json::Value>,
    pub opts: ExecuteOptions,
}

impl TemplateRequest {
    pub fn new(template: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            template: template.into(),
            params,
            opts: ExecuteOptions::default(),
        }
    }

    pub fn with_opts(mut self, opts: ExecuteOptions) -> Self {
        self.opts = opts;
        self
    }
}

/// `tower::Service` adapter for [`ConnectionManager::execute_template`].
#[derive(Clone)]
pub struct GatewayService {
    manager: Arc<ConnectionManager>,
}

impl GatewayService {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

impl Service<TemplateRequest> for GatewayService {
    type Response = QueryRows;
    type Error = AccessError;
    type Future = BoxFuture<'static, Result<QueryRows, AccessError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Admission is decided per call by breakers and pools.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: TemplateRequest) -> Self::Future {
        let manager = Arc::clone(&self.manager);
        Box::pin(async move {
            manager
                .execute_template(&req.template, &req.params, req.opts)
                .await
        })
    }
}
