//! The response envelope.
//!
//! An [`Envelope`] accumulates everything a frontend needs next to the
//! payload of a response: categorized messages, form field errors,
//! pagination metadata and, optionally, the login state of the caller.
//! Handlers create one per request, mutate it through the helpers below and
//! call [`Envelope::finalize`] once before returning.
//!
//! ## Wire shape
//!
//! ```json
//! {
//!   "messages": {"error": [], "info": [], "success": [], "warning": []},
//!   "field_errors": {},
//!   "has_errors": false,
//!   "pagination": {"total_results": 42, "has_next_page": true, "next_page_number": 3},
//!   "has_pagination_data": true,
//!   "is_logged_in": true,
//!   "is_superuser": false
//! }
//! ```
//!
//! `pagination`/`has_pagination_data` only appear once pagination has been
//! attached, `is_logged_in`/`is_superuser` only when identity enrichment is
//! enabled. Extra fields set by the caller sit next to these keys.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::EnvelopeError;
use crate::form::{FieldErrors, ValidatedForm};
use crate::identity::{IdentityFlags, IdentitySource};
use crate::message::{Message, Messages, Severity};
use crate::pagination::{PageCursor, Pagination, Paginator};

/// Keys owned by the envelope; extra fields may not use them.
pub const RESERVED_FIELDS: &[&str] = &[
    "messages",
    "field_errors",
    "has_errors",
    "pagination",
    "has_pagination_data",
    "is_logged_in",
    "is_superuser",
];

/// Builder for [`Envelope`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use common_api_core::{Envelope, StaticIdentity};
///
/// let envelope = Envelope::builder()
///     .identity_source(Arc::new(StaticIdentity::user()))
///     .append_identity(true)
///     .extra("data", serde_json::json!([1, 2, 3]))
///     .build()
///     .unwrap();
/// assert_eq!(envelope.get_field("data"), Some(&serde_json::json!([1, 2, 3])));
/// ```
#[derive(Default)]
pub struct EnvelopeBuilder {
    identity_source: Option<Arc<dyn IdentitySource>>,
    messages: Option<Messages>,
    append_identity: bool,
    extra: Map<String, Value>,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source queried for `is_logged_in`/`is_superuser` at finalize time.
    pub fn identity_source(mut self, source: Arc<dyn IdentitySource>) -> Self {
        self.identity_source = Some(source);
        self
    }

    /// Start from pre-filled message buckets instead of four empty ones.
    pub fn messages(mut self, messages: Messages) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Write identity flags into the payload on every finalize.
    pub fn append_identity(mut self, enabled: bool) -> Self {
        self.append_identity = enabled;
        self
    }

    /// Merge an extra key/value pair into the payload.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Envelope, EnvelopeError> {
        if self.append_identity && self.identity_source.is_none() {
            return Err(EnvelopeError::MissingIdentitySource);
        }
        if let Some(key) = self.extra.keys().find(|k| is_reserved(k)) {
            return Err(EnvelopeError::ReservedField(key.clone()));
        }

        Ok(Envelope {
            messages: self.messages.unwrap_or_default(),
            field_errors: FieldErrors::new(),
            has_errors: false,
            pagination: None,
            identity: None,
            extra: self.extra,
            identity_source: self.identity_source,
            append_identity: self.append_identity,
        })
    }
}

/// Response metadata accumulated over one request.
#[derive(Clone, Default)]
pub struct Envelope {
    messages: Messages,
    field_errors: FieldErrors,
    has_errors: bool,
    pagination: Option<Pagination>,
    identity: Option<IdentityFlags>,
    extra: Map<String, Value>,
    identity_source: Option<Arc<dyn IdentitySource>>,
    append_identity: bool,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("messages", &self.messages)
            .field("field_errors", &self.field_errors)
            .field("has_errors", &self.has_errors)
            .field("pagination", &self.pagination)
            .field("identity", &self.identity)
            .field("extra", &self.extra)
            .field("has_identity_source", &self.identity_source.is_some())
            .field("append_identity", &self.append_identity)
            .finish()
    }
}

impl Envelope {
    /// Empty envelope without identity enrichment.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::new()
    }

    // ---- Messages ----

    /// Append a message under `severity` (`error`, `info`, `success` or `warning`).
    ///
    /// Fails with [`EnvelopeError::InvalidSeverity`] for any other severity,
    /// leaving the envelope untouched.
    pub fn add_message(
        &mut self,
        severity: &str,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<&mut Self, EnvelopeError> {
        let severity = severity.parse::<Severity>()?;
        Ok(self.push_message(severity, title, message))
    }

    /// Append a message under an already validated severity.
    pub fn push_message(
        &mut self,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.messages.push(Message::new(severity, title, message));
        self
    }

    pub fn add_error_message(
        &mut self,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.push_message(Severity::Error, title, message)
    }

    pub fn add_info_message(
        &mut self,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.push_message(Severity::Info, title, message)
    }

    pub fn add_success_message(
        &mut self,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.push_message(Severity::Success, title, message)
    }

    pub fn add_warning_message(
        &mut self,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.push_message(Severity::Warning, title, message)
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    // ---- Field errors ----

    /// Replace the field errors with `errors`. Never merges.
    pub fn attach_field_errors(&mut self, errors: FieldErrors) -> &FieldErrors {
        self.field_errors = errors;
        &self.field_errors
    }

    /// Replace the field errors with the ones reported by `form`.
    pub fn attach_form_errors<F>(&mut self, form: &F) -> &FieldErrors
    where
        F: ValidatedForm + ?Sized,
    {
        self.attach_field_errors(form.field_errors())
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    /// `true` if an error message was added, or, when `include_field_errors`
    /// is set, if any field errors are attached.
    pub fn has_errors(&self, include_field_errors: bool) -> bool {
        !self.messages.get(Severity::Error).is_empty()
            || (include_field_errors && !self.field_errors.is_empty())
    }

    // ---- Pagination ----

    /// Populate the pagination block from a total and/or page cursors.
    ///
    /// Keys belonging to an absent cursor are omitted.
    pub fn attach_pagination(
        &mut self,
        total_results: Option<u64>,
        next_page: Option<&dyn PageCursor>,
        previous_page: Option<&dyn PageCursor>,
    ) -> &Pagination {
        let pagination = Pagination::from_cursors(total_results, next_page, previous_page);
        self.pagination.insert(pagination)
    }

    /// Populate the pagination block from a paginator and the current page.
    pub fn attach_page<P, C>(&mut self, paginator: &P, page: &C) -> &Pagination
    where
        P: Paginator + ?Sized,
        C: PageCursor,
    {
        self.attach_pagination(Some(paginator.count()), Some(page), Some(page))
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    pub fn has_pagination_data(&self) -> bool {
        self.pagination.is_some()
    }

    // ---- Extra fields ----

    /// Set an extra field, returning the previous value.
    ///
    /// Envelope-owned keys (see [`RESERVED_FIELDS`]) are rejected; use the
    /// typed helpers for those.
    pub fn set_field(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, EnvelopeError> {
        let key = key.into();
        if is_reserved(&key) {
            return Err(EnvelopeError::ReservedField(key));
        }
        Ok(self.extra.insert(key, value.into()))
    }

    pub fn get_field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.extra.remove(key)
    }

    // ---- Finalize ----

    /// Recompute derived fields and return the payload.
    ///
    /// `has_errors` is recomputed without field errors. With identity
    /// enrichment enabled the identity source is queried on every call.
    pub fn finalize(&mut self) -> Value {
        self.has_errors = self.has_errors(false);

        if self.append_identity {
            self.identity = self
                .identity_source
                .as_deref()
                .map(IdentityFlags::lookup);
        }

        tracing::trace!(
            has_errors = self.has_errors,
            messages = self.messages.len(),
            field_errors = self.field_errors.len(),
            "finalizing envelope"
        );

        self.to_value()
    }

    /// Last computed value of `has_errors`, as written by [`finalize`](Self::finalize).
    pub fn finalized_has_errors(&self) -> bool {
        self.has_errors
    }

    /// Identity flags computed by the last [`finalize`](Self::finalize), if any.
    pub fn identity(&self) -> Option<IdentityFlags> {
        self.identity
    }

    fn to_value(&self) -> Value {
        let mut payload = self.extra.clone();

        payload.insert("messages".into(), to_json(&self.messages));
        payload.insert(
            "field_errors".into(),
            Value::Object(self.field_errors.clone()),
        );
        payload.insert("has_errors".into(), Value::Bool(self.has_errors));

        if let Some(pagination) = &self.pagination {
            payload.insert("pagination".into(), to_json(pagination));
            payload.insert("has_pagination_data".into(), Value::Bool(true));
        }

        if let Some(identity) = self.identity {
            payload.insert("is_logged_in".into(), Value::Bool(identity.is_logged_in));
            payload.insert("is_superuser".into(), Value::Bool(identity.is_superuser));
        }

        Value::Object(payload)
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_FIELDS.contains(&key)
}

// Plain data structs with string keys cannot fail to serialize.
fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
