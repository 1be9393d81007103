//! Ordered request pipeline.
//!
//! A [`Pipeline`] is a list of named [`RequestStage`]s run in insertion
//! order before the handler. Each stage receives the request and either
//! hands it on (possibly modified) or answers it directly, which stops the
//! pipeline.
//!
//! ```rust,ignore
//! use common_api::{GuardStage, JsonBodyNormalizer, LoginRequired, Pipeline, SessionKeyStage};
//!
//! let pipeline = Pipeline::new()
//!     .stage(JsonBodyNormalizer::new())        // reads the body at most once
//!     .stage(SessionKeyStage::new())           // needs the parsed body
//!     .stage(GuardStage::new("login", LoginRequired::default()));
//! ```

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures::future::BoxFuture;

/// What a stage decided: hand the request on, or answer it.
pub type StageOutcome = ControlFlow<Response, Request<Body>>;

/// One named request transform.
pub trait RequestStage: Send + Sync + 'static {
    /// Stable name, used in logs.
    fn name(&self) -> &str;

    fn apply<'a>(&'a self, req: Request<Body>) -> BoxFuture<'a, StageOutcome>;
}

/// Ordered stages run before the handler.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn RequestStage>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.names())
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; it runs after every stage added before it.
    pub fn stage(mut self, stage: impl RequestStage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append an already shared stage.
    pub fn shared_stage(mut self, stage: Arc<dyn RequestStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run all stages in order, stopping at the first one that answers.
    pub async fn run(&self, mut req: Request<Body>) -> StageOutcome {
        for stage in &self.stages {
            tracing::trace!(stage = stage.name(), "running request stage");
            match stage.apply(req).await {
                ControlFlow::Continue(next) => req = next,
                ControlFlow::Break(response) => {
                    tracing::debug!(
                        stage = stage.name(),
                        status = %response.status(),
                        "request stage answered the request"
                    );
                    return ControlFlow::Break(response);
                }
            }
        }
        ControlFlow::Continue(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use futures::FutureExt;

    struct Tag(&'static str);

    impl RequestStage for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn apply<'a>(&'a self, mut req: Request<Body>) -> BoxFuture<'a, StageOutcome> {
            async move {
                let trail = match req.headers().get("x-trail") {
                    Some(v) => format!("{},{}", v.to_str().unwrap_or(""), self.0),
                    None => self.0.to_string(),
                };
                req.headers_mut()
                    .insert("x-trail", HeaderValue::from_str(&trail).unwrap());
                ControlFlow::Continue(req)
            }
            .boxed()
        }
    }

    struct Stop;

    impl RequestStage for Stop {
        fn name(&self) -> &str {
            "stop"
        }

        fn apply<'a>(&'a self, _req: Request<Body>) -> BoxFuture<'a, StageOutcome> {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::ACCEPTED;
            futures::future::ready(ControlFlow::Break(response)).boxed()
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let pipeline = Pipeline::new()
            .stage(Tag("a"))
            .stage(Tag("b"))
            .stage(Tag("c"));
        assert_eq!(pipeline.names(), ["a", "b", "c"]);

        let req = Request::builder().body(Body::empty()).unwrap();
        let ControlFlow::Continue(req) = pipeline.run(req).await else {
            panic!("pipeline should continue");
        };
        assert_eq!(req.headers()["x-trail"], "a,b,c");
    }

    #[tokio::test]
    async fn test_short_circuit_skips_later_stages() {
        let pipeline = Pipeline::new()
            .stage(Tag("a"))
            .stage(Stop)
            .stage(Tag("never"));

        let req = Request::builder().body(Body::empty()).unwrap();
        let ControlFlow::Break(response) = pipeline.run(req).await else {
            panic!("pipeline should stop");
        };
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_empty_pipeline_continues() {
        let pipeline = Pipeline::new();
        assert!(pipeline.is_empty());
        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let ControlFlow::Continue(req) = pipeline.run(req).await else {
            panic!("pipeline should continue");
        };
        assert_eq!(req.uri(), "/x");
    }
}
