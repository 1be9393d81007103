//! Request extensions written by the pipeline stages, and their extractors.
//!
//! None of the extractors here reject: a missing extension means the stage
//! that writes it did not run, which handlers treat as "nothing there".

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common_api_core::{AnonymousUser, IdentitySource};
use serde_json::Value;

/// Parsed JSON body, or `None` when the body was not JSON or failed to parse.
///
/// Always present after [`JsonBodyNormalizer`](crate::JsonBodyNormalizer) ran.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JsonBody(pub Option<Value>);

impl JsonBody {
    pub fn value(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    /// Field of a parsed JSON object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.as_ref().and_then(|v| v.get(key))
    }
}

/// What the normalizer did with the request body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyState {
    /// Not a JSON candidate; the body was not parsed.
    #[default]
    Unparsed,
    /// Parsed successfully; see [`JsonBody`].
    Parsed,
    /// Looked like JSON but could not be read or parsed. Not an error for the caller.
    ParseFailed,
}

/// The native form-field map.
///
/// Filled from `application/x-www-form-urlencoded` bodies, and receives the
/// anti-forgery token copied out of JSON bodies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormFields(BTreeMap<String, String>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for FormFields {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Session key resolved by [`SessionKeyStage`](crate::SessionKeyStage).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionKey(pub Option<String>);

/// The identity of the caller, inserted by the host's authentication layer.
///
/// Extracting it never fails; requests without one are anonymous.
#[derive(Clone)]
pub struct CurrentUser(pub Arc<dyn IdentitySource>);

impl CurrentUser {
    pub fn new(identity: impl IdentitySource + 'static) -> Self {
        Self(Arc::new(identity))
    }

    pub fn anonymous() -> Self {
        Self::new(AnonymousUser)
    }

    pub fn identity(&self) -> &dyn IdentitySource {
        self.0.as_ref()
    }

    /// Shared handle, e.g. for [`EnvelopeBuilder::identity_source`](common_api_core::EnvelopeBuilder::identity_source).
    pub fn source(&self) -> Arc<dyn IdentitySource> {
        self.0.clone()
    }
}

impl Default for CurrentUser {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentUser")
            .field("is_authenticated", &self.0.is_authenticated())
            .finish()
    }
}

/// Extractor for the parsed JSON body; `Value::Null` when absent.
///
/// ```rust,ignore
/// async fn handler(JsonData(data): JsonData) -> impl IntoResponse {
///     let name = data.get("name").and_then(|v| v.as_str()).unwrap_or("anonymous");
///     // ...
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JsonData(pub Value);

impl<S> FromRequestParts<S> for JsonData
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .extensions
            .get::<JsonBody>()
            .and_then(|body| body.0.clone())
            .unwrap_or(Value::Null);
        Ok(JsonData(value))
    }
}

impl<S> FromRequestParts<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<FormFields>()
            .cloned()
            .unwrap_or_default())
    }
}

impl<S> FromRequestParts<S> for SessionKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SessionKey>()
            .cloned()
            .unwrap_or_default())
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use common_api_core::StaticIdentity;
    use serde_json::json;

    fn parts_with<T: Clone + Send + Sync + 'static>(ext: Option<T>) -> Parts {
        let mut req = Request::builder().body(()).unwrap();
        if let Some(ext) = ext {
            req.extensions_mut().insert(ext);
        }
        req.into_parts().0
    }

    #[tokio::test]
    async fn test_json_data_present() {
        let mut parts = parts_with(Some(JsonBody(Some(json!({"x": 1})))));
        let JsonData(value) = JsonData::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(value, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_json_data_absent_is_null() {
        let mut parts = parts_with::<JsonBody>(None);
        let JsonData(value) = JsonData::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(value, Value::Null);

        let mut parts = parts_with(Some(JsonBody(None)));
        let JsonData(value) = JsonData::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_current_user_defaults_to_anonymous() {
        let mut parts = parts_with::<CurrentUser>(None);
        let user = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(!user.identity().is_authenticated());

        let mut parts = parts_with(Some(CurrentUser::new(StaticIdentity::user())));
        let user = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(user.identity().is_authenticated());
    }

    #[tokio::test]
    async fn test_form_fields_default_empty() {
        let mut parts = parts_with::<FormFields>(None);
        let fields = FormFields::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn test_json_body_get() {
        let body = JsonBody(Some(json!({"a": "b"})));
        assert_eq!(body.get("a"), Some(&json!("b")));
        assert_eq!(JsonBody(Some(json!([1]))).get("a"), None);
        assert_eq!(JsonBody::default().get("a"), None);
    }
}
