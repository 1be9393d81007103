//! JSON request body normalization.
//!
//! Frontends post JSON, while anti-forgery checks and form handling look
//! for values in the form-field map. [`JsonBodyNormalizer`] bridges the two:
//!
//! 1. Decide from the method and `Content-Type` whether the body is a
//!    candidate. This happens before anything is read; multipart uploads
//!    and oversized bodies are forwarded untouched.
//! 2. Read the body once, parse it, and put it back so later extractors
//!    still see the same bytes.
//! 3. Publish [`JsonBody`] and [`BodyState`], and copy the token field into
//!    [`FormFields`].
//!
//! A body that fails to parse is not an error: the request continues with
//! `JsonBody(None)` and `BodyState::ParseFailed`.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, Request};
use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt};
use http_body_util::BodyExt;
use serde_json::Value;

use crate::config::{NormalizerConfig, ParseMode};
use crate::extract::{BodyState, FormFields, JsonBody};
use crate::pipeline::{RequestStage, StageOutcome};

/// Body encoding, judged from the `Content-Type` header alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// `application/json` or any `+json` media type.
    Json,
    /// `application/x-www-form-urlencoded`.
    UrlEncoded,
    /// `multipart/*`, usually carrying file uploads.
    Multipart,
    /// Anything else, including a missing header.
    Other,
}

impl BodyKind {
    /// Classify a `Content-Type` value; parameters such as `charset` are ignored.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        if essence == "application/json" || essence.ends_with("+json") {
            Self::Json
        } else if essence == "application/x-www-form-urlencoded" {
            Self::UrlEncoded
        } else if essence.starts_with("multipart/") {
            Self::Multipart
        } else {
            Self::Other
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(Self::from_content_type)
            .unwrap_or(Self::Other)
    }
}

/// Methods whose requests may carry a body worth parsing.
pub fn may_carry_body(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Pipeline stage exposing JSON bodies as [`JsonBody`] and [`FormFields`].
#[derive(Clone, Debug, Default)]
pub struct JsonBodyNormalizer {
    config: NormalizerConfig,
}

impl JsonBodyNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize one request. Never fails.
    pub async fn normalize(&self, req: Request<Body>) -> Request<Body> {
        let (mut parts, body) = req.into_parts();
        parts.extensions.insert(JsonBody(None));
        parts.extensions.insert(BodyState::Unparsed);

        if !may_carry_body(&parts.method) {
            return Request::from_parts(parts, body);
        }

        let kind = BodyKind::from_headers(&parts.headers);
        let json_candidate = match self.config.get_mode() {
            ParseMode::ContentType => kind == BodyKind::Json,
            ParseMode::AnyBody => kind != BodyKind::Multipart,
        };

        // Multipart streams belong to the upload handling downstream
        if !json_candidate && kind != BodyKind::UrlEncoded {
            return Request::from_parts(parts, body);
        }

        if let Some(length) = content_length(&parts.headers)
            && self.config.exceeds_limit(length)
        {
            tracing::debug!(
                content_length = length,
                limit = ?self.config.get_receive_max_bytes(),
                "request body above normalizer limit, left unread"
            );
            return Request::from_parts(parts, body);
        }

        let limit = self.config.receive_max_bytes_or_max();
        let bytes = match read_bounded(body, limit).await {
            Buffered::Complete(bytes) => bytes,
            Buffered::Overflow(body) => {
                tracing::debug!(
                    limit = ?self.config.get_receive_max_bytes(),
                    "streamed request body above normalizer limit, forwarded unparsed"
                );
                return Request::from_parts(parts, body);
            }
            Buffered::Failed(body) => {
                if json_candidate {
                    parts.extensions.insert(BodyState::ParseFailed);
                }
                return Request::from_parts(parts, body);
            }
        };

        if kind == BodyKind::UrlEncoded
            && let Some(fields) = parse_form(&bytes)
        {
            parts.extensions.insert(fields);
        }

        if json_candidate {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => {
                    if let Some(token) = value
                        .get(self.config.get_token_field())
                        .and_then(Value::as_str)
                        .filter(|t| !t.is_empty())
                    {
                        let mut fields = parts
                            .extensions
                            .remove::<FormFields>()
                            .unwrap_or_default();
                        fields.insert(self.config.get_token_field(), token);
                        parts.extensions.insert(fields);
                    }
                    parts.extensions.insert(JsonBody(Some(value)));
                    parts.extensions.insert(BodyState::Parsed);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "request body is not valid JSON");
                    parts.extensions.insert(BodyState::ParseFailed);
                }
            }
        }

        Request::from_parts(parts, Body::from(bytes))
    }
}

impl RequestStage for JsonBodyNormalizer {
    fn name(&self) -> &str {
        "json_body"
    }

    fn apply<'a>(&'a self, req: Request<Body>) -> BoxFuture<'a, StageOutcome> {
        async move {
            let req = self.normalize(req).await;
            ControlFlow::Continue(req)
        }
        .boxed()
    }
}

/// Result of reading a body up to a byte limit.
enum Buffered {
    /// The whole body, within the limit.
    Complete(Bytes),
    /// The body ran past the limit; rebuilt from the chunks read so far and the unread rest.
    Overflow(Body),
    /// Reading failed; rebuilt from the chunks read so far, followed by the error.
    Failed(Body),
}

/// Read `body` frame by frame, stopping as soon as more than `limit` bytes arrived.
///
/// Nothing is lost when reading stops early: the returned body replays the
/// buffered chunks before the remaining stream.
async fn read_bounded(mut body: Body, limit: usize) -> Buffered {
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut size = 0usize;

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read request body");
                let replay = buffered_stream(chunks)
                    .chain(stream::once(async { Err(err) }));
                return Buffered::Failed(Body::from_stream(replay));
            }
        };
        // Trailers are not part of the payload
        if let Ok(data) = frame.into_data() {
            size = size.saturating_add(data.len());
            chunks.push(data);
        }
        if size > limit {
            let replay = buffered_stream(chunks).chain(body.into_data_stream());
            return Buffered::Overflow(Body::from_stream(replay));
        }
    }

    let bytes = match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => {
            let mut buf = BytesMut::with_capacity(size);
            for chunk in &chunks {
                buf.extend_from_slice(chunk);
            }
            buf.freeze()
        }
    };
    Buffered::Complete(bytes)
}

fn buffered_stream(
    chunks: Vec<Bytes>,
) -> impl Stream<Item = Result<Bytes, axum::Error>> + Send + 'static {
    stream::iter(chunks.into_iter().map(Ok))
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

fn parse_form(bytes: &Bytes) -> Option<FormFields> {
    match serde_qs::from_bytes::<BTreeMap<String, String>>(bytes) {
        Ok(map) => Some(FormFields::from(map)),
        Err(err) => {
            tracing::debug!(error = %err, "request body is not a flat form");
            None
        }
    }
}
