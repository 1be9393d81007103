//! Turning envelopes into axum responses.

use axum::Json;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use common_api_core::Envelope;
use serde_json::Value;

/// A finalized envelope plus the status code and headers to send it with.
#[derive(Clone, Debug)]
pub struct EnvelopeResponse {
    body: Value,
    status: StatusCode,
    headers: HeaderMap,
}

impl EnvelopeResponse {
    /// Wrap an already finalized payload, sent with `200 OK`.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add a response header. Invalid names or values are dropped.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let key_str = key.as_ref();
        let val_str = value.as_ref();

        match (
            HeaderName::from_bytes(key_str.as_bytes()),
            HeaderValue::from_str(val_str),
        ) {
            (Ok(name), Ok(val)) => {
                self.headers.append(name, val);
            }
            (Err(e), _) => {
                tracing::debug!(key = key_str, error = %e, "invalid header name, header dropped");
            }
            (_, Err(e)) => {
                tracing::debug!(
                    key = key_str,
                    value = val_str,
                    error = %e,
                    "invalid header value, header dropped"
                );
            }
        }
        self
    }

    /// Merge a prepared header map.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn get_status(&self) -> StatusCode {
        self.status
    }

    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl IntoResponse for EnvelopeResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, Json(self.body)).into_response()
    }
}

/// Finalize an [`Envelope`] straight into a response.
pub trait EnvelopeExt {
    /// Finalize and answer with `200 OK`.
    fn respond(&mut self) -> EnvelopeResponse;

    /// Finalize and answer with `status`.
    fn respond_with(&mut self, status: StatusCode) -> EnvelopeResponse {
        self.respond().status(status)
    }
}

impl EnvelopeExt for Envelope {
    fn respond(&mut self) -> EnvelopeResponse {
        EnvelopeResponse::new(self.finalize())
    }
}
