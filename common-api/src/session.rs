//! Session key resolution for JSON clients.
//!
//! Browser clients send the session key as a cookie. API clients that
//! cannot keep cookies may send it inside the JSON body under the same
//! name. [`SessionKeyStage`] checks the cookie first, then the parsed body,
//! and publishes the result as [`SessionKey`]. Loading the session is left
//! to the host.

use std::ops::ControlFlow;

use axum::body::Body;
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, Request};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::SessionConfig;
use crate::extract::{JsonBody, SessionKey};
use crate::pipeline::{RequestStage, StageOutcome};

/// Pipeline stage resolving the session key. Place it after
/// [`JsonBodyNormalizer`](crate::JsonBodyNormalizer).
#[derive(Clone, Debug, Default)]
pub struct SessionKeyStage {
    config: SessionConfig,
}

impl SessionKeyStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Session key from the cookie, falling back to the parsed JSON body.
    pub fn resolve<B>(&self, req: &Request<B>) -> Option<String> {
        let name = self.config.get_cookie_name();
        cookie_value(req.headers(), name)
            .or_else(|| {
                req.extensions()
                    .get::<JsonBody>()
                    .and_then(|body| body.get(name))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .filter(|key| !key.is_empty())
    }
}

impl RequestStage for SessionKeyStage {
    fn name(&self) -> &str {
        "session_key"
    }

    fn apply<'a>(&'a self, mut req: Request<Body>) -> BoxFuture<'a, StageOutcome> {
        let key = self.resolve(&req);
        tracing::trace!(found = key.is_some(), "resolved session key");
        req.extensions_mut().insert(SessionKey(key));
        futures::future::ready(ControlFlow::Continue(req)).boxed()
    }
}

/// Value of cookie `name` across all `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder();
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut().insert(JsonBody(body));
        req
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, "theme=dark; sessionid=abc123".parse().unwrap());
        headers.append(COOKIE, "other=\"quoted\"".parse().unwrap());

        assert_eq!(
            cookie_value(&headers, "sessionid").as_deref(),
            Some("abc123")
        );
        assert_eq!(cookie_value(&headers, "other").as_deref(), Some("quoted"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_wins_over_body() {
        let stage = SessionKeyStage::new();
        let req = request(
            Some("sessionid=from-cookie"),
            Some(json!({"sessionid": "from-body"})),
        );
        assert_eq!(stage.resolve(&req).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_body_fallback() {
        let stage = SessionKeyStage::new();
        let req = request(Some("theme=dark"), Some(json!({"sessionid": "from-body"})));
        assert_eq!(stage.resolve(&req).as_deref(), Some("from-body"));
    }

    #[test]
    fn test_no_session() {
        let stage = SessionKeyStage::new();
        assert_eq!(stage.resolve(&request(None, None)), None);
        assert_eq!(stage.resolve(&request(Some("sessionid="), None)), None);
    }

    #[test]
    fn test_custom_cookie_name() {
        let stage = SessionKeyStage::with_config(SessionConfig::new().cookie_name("sid"));
        let req = request(None, Some(json!({"sid": "k1", "sessionid": "k2"})));
        assert_eq!(stage.resolve(&req).as_deref(), Some("k1"));
    }

    #[tokio::test]
    async fn test_stage_inserts_extension() {
        let stage = SessionKeyStage::new();
        let req = request(Some("sessionid=abc"), None);
        let ControlFlow::Continue(req) = stage.apply(req).await else {
            panic!("session stage never answers");
        };
        assert_eq!(
            req.extensions().get::<SessionKey>(),
            Some(&SessionKey(Some("abc".into())))
        );
    }
}
