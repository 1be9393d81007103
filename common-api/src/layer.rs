//! Tower layer running a [`Pipeline`] in front of a service.
//!
//! ```rust,ignore
//! use axum::{Router, routing::post};
//! use common_api::{JsonBodyNormalizer, Pipeline, PipelineLayer};
//!
//! let app = Router::new()
//!     .route("/login", post(login))
//!     .layer(PipelineLayer::new(Pipeline::new().stage(JsonBodyNormalizer::new())));
//! ```
//!
//! The layer never fails on its own: a stage that cannot let the request
//! through answers it with a response instead.

use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use tower::{Layer, Service, ServiceExt};

use crate::pipeline::Pipeline;

/// Layer that runs a [`Pipeline`] before the inner service.
#[derive(Debug, Clone, Default)]
pub struct PipelineLayer {
    pipeline: Arc<Pipeline>,
}

impl PipelineLayer {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

impl<S> Layer<S> for PipelineLayer {
    type Service = PipelineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineService {
            inner,
            pipeline: self.pipeline.clone(),
        }
    }
}

/// Service produced by [`PipelineLayer`].
#[derive(Debug, Clone)]
pub struct PipelineService<S> {
    inner: S,
    pipeline: Arc<Pipeline>,
}

impl<S> Service<Request<Body>> for PipelineService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let pipeline = self.pipeline.clone();

        // Take the service that was driven to readiness, leave a clone behind
        let inner = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            match pipeline.run(req).await {
                ControlFlow::Continue(req) => inner.oneshot(req).await,
                ControlFlow::Break(response) => Ok(response),
            }
        })
    }
}
