//! Request guards.
//!
//! A [`Guard`] looks at the method, headers and caller identity of a request
//! and returns a [`Verdict`]. Denials are answered with a regular envelope
//! carrying a warning message and `200 OK`, so frontends handle them like
//! any other response.
//!
//! Guards can be checked at the top of a handler:
//!
//! ```rust,ignore
//! async fn profile(method: Method, headers: HeaderMap, user: CurrentUser) -> Result<Json<Value>, Denial> {
//!     LoginRequired::default()
//!         .check(&GuardRequest::new(&method, &headers, user.identity()))
//!         .into_result()?;
//!     // ...
//! }
//! ```
//!
//! or run for a whole router through [`GuardStage`].

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Request};
use axum::response::{IntoResponse, Response};
use common_api_core::{AnonymousUser, Envelope, IdentitySource};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::extract::CurrentUser;
use crate::pipeline::{RequestStage, StageOutcome};

/// Header set by XHR clients.
pub const X_REQUESTED_WITH: &str = "x-requested-with";

/// What a guard sees of a request.
#[derive(Clone, Copy)]
pub struct GuardRequest<'a> {
    pub method: &'a Method,
    pub headers: &'a HeaderMap,
    pub user: &'a dyn IdentitySource,
}

impl fmt::Debug for GuardRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardRequest")
            .field("method", self.method)
            .field("is_authenticated", &self.user.is_authenticated())
            .finish()
    }
}

impl<'a> GuardRequest<'a> {
    pub fn new(method: &'a Method, headers: &'a HeaderMap, user: &'a dyn IdentitySource) -> Self {
        Self {
            method,
            headers,
            user,
        }
    }

    /// View of a request; the user comes from [`CurrentUser`], anonymous if absent.
    pub fn from_request<B>(req: &'a Request<B>) -> Self {
        Self::new(
            req.method(),
            req.headers(),
            current_user(req.extensions().get::<CurrentUser>()),
        )
    }

    pub fn from_parts(parts: &'a Parts) -> Self {
        Self::new(
            &parts.method,
            &parts.headers,
            current_user(parts.extensions.get::<CurrentUser>()),
        )
    }

    /// `true` for requests sent with `X-Requested-With: XMLHttpRequest`.
    pub fn is_ajax(&self) -> bool {
        self.headers
            .get(X_REQUESTED_WITH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "XMLHttpRequest")
    }
}

fn current_user(user: Option<&CurrentUser>) -> &dyn IdentitySource {
    match user {
        Some(user) => user.identity(),
        None => &AnonymousUser,
    }
}

/// Why a request was turned away.
#[derive(Clone, Debug, PartialEq)]
pub enum Denial {
    /// Answered with an envelope holding one warning message.
    Message { title: String, message: String },
    /// Answered with this JSON payload as is.
    Payload(Value),
}

impl Denial {
    pub fn message(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Message {
            title: title.into(),
            message: message.into(),
        }
    }

    /// The JSON payload sent for this denial.
    pub fn into_body(self) -> Value {
        match self {
            Denial::Message { title, message } => {
                let mut envelope = Envelope::new();
                envelope.add_warning_message(title, message);
                envelope.finalize()
            }
            Denial::Payload(value) => value,
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        Json(self.into_body()).into_response()
    }
}

/// Outcome of a guard check.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Allow,
    Deny(Denial),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    /// `Ok(())` when allowed, so handlers can use `?`.
    pub fn into_result(self) -> Result<(), Denial> {
        match self {
            Verdict::Allow => Ok(()),
            Verdict::Deny(denial) => Err(denial),
        }
    }
}

/// A request predicate.
pub trait Guard: Send + Sync + 'static {
    fn check(&self, req: &GuardRequest<'_>) -> Verdict;
}

impl<G: Guard + ?Sized> Guard for Arc<G> {
    fn check(&self, req: &GuardRequest<'_>) -> Verdict {
        (**self).check(req)
    }
}

macro_rules! message_guard {
    ($(#[$meta:meta])* $name:ident, $title:expr, $message:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $name {
            title: String,
            message: String,
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new($title, $message)
            }
        }

        impl $name {
            /// Guard answering denials with a custom title and message.
            pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
                Self {
                    title: title.into(),
                    message: message.into(),
                }
            }

            fn deny(&self) -> Verdict {
                Verdict::Deny(Denial::message(&self.title, &self.message))
            }
        }
    };
}

message_guard!(
    /// Only authenticated callers pass.
    LoginRequired,
    "Not Logged In",
    "Please Make sure you are logged in."
);

message_guard!(
    /// Only anonymous callers pass.
    LogoutRequired,
    "Already Logged In",
    "Please logout before accessing this page."
);

message_guard!(
    /// Only XHR requests pass.
    AjaxOnly,
    "Not Allowed",
    "Request to this page is forbidden, please make sure you use authentic app."
);

impl Guard for LoginRequired {
    fn check(&self, req: &GuardRequest<'_>) -> Verdict {
        if req.user.is_authenticated() {
            Verdict::Allow
        } else {
            self.deny()
        }
    }
}

impl Guard for LogoutRequired {
    fn check(&self, req: &GuardRequest<'_>) -> Verdict {
        if req.user.is_authenticated() {
            self.deny()
        } else {
            Verdict::Allow
        }
    }
}

impl Guard for AjaxOnly {
    fn check(&self, req: &GuardRequest<'_>) -> Verdict {
        if req.is_ajax() {
            Verdict::Allow
        } else {
            self.deny()
        }
    }
}

/// Only the listed methods pass. Defaults to `GET` and `POST`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowedMethods {
    methods: Vec<Method>,
    title: String,
    message: String,
}

impl Default for AllowedMethods {
    fn default() -> Self {
        Self::new([Method::GET, Method::POST])
    }
}

impl AllowedMethods {
    /// Allow `methods`; the denial message lists them.
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        let methods: Vec<Method> = methods.into_iter().collect();
        let listed = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            message: format!("Available Methods are \"{listed}\" only"),
            title: "Method Not Allowed".to_string(),
            methods,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }
}

impl Guard for AllowedMethods {
    fn check(&self, req: &GuardRequest<'_>) -> Verdict {
        if self.methods.contains(req.method) {
            Verdict::Allow
        } else {
            Verdict::Deny(Denial::message(&self.title, &self.message))
        }
    }
}

/// Callers for whom `test` holds pass; others get `failed` as the response body.
pub struct UserPassesTest<F> {
    test: F,
    failed: Value,
}

impl<F> fmt::Debug for UserPassesTest<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPassesTest")
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl<F> UserPassesTest<F>
where
    F: Fn(&dyn IdentitySource) -> bool + Send + Sync + 'static,
{
    pub fn new(test: F, failed: Value) -> Self {
        Self { test, failed }
    }
}

impl UserPassesTest<fn(&dyn IdentitySource) -> bool> {
    /// A test with a fixed outcome.
    pub fn constant(passed: bool, failed: Value) -> Self {
        fn pass(_: &dyn IdentitySource) -> bool {
            true
        }
        fn fail(_: &dyn IdentitySource) -> bool {
            false
        }
        Self {
            test: if passed { pass } else { fail },
            failed,
        }
    }
}

impl<F> Guard for UserPassesTest<F>
where
    F: Fn(&dyn IdentitySource) -> bool + Send + Sync + 'static,
{
    fn check(&self, req: &GuardRequest<'_>) -> Verdict {
        if (self.test)(req.user) {
            Verdict::Allow
        } else {
            Verdict::Deny(Denial::Payload(self.failed.clone()))
        }
    }
}

/// A guard built from a closure.
pub struct FnGuard<F>(F);

/// Wrap a closure as a [`Guard`].
pub fn guard_fn<F>(f: F) -> FnGuard<F>
where
    F: Fn(&GuardRequest<'_>) -> Verdict + Send + Sync + 'static,
{
    FnGuard(f)
}

impl<F> Guard for FnGuard<F>
where
    F: Fn(&GuardRequest<'_>) -> Verdict + Send + Sync + 'static,
{
    fn check(&self, req: &GuardRequest<'_>) -> Verdict {
        (self.0)(req)
    }
}

/// Guards checked in order; the first denial wins.
#[derive(Clone, Default)]
pub struct GuardChain {
    guards: Vec<Arc<dyn Guard>>,
}

impl fmt::Debug for GuardChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardChain")
            .field("guards", &self.guards.len())
            .finish()
    }
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, guard: impl Guard) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Guard for GuardChain {
    fn check(&self, req: &GuardRequest<'_>) -> Verdict {
        self.guards
            .iter()
            .map(|guard| guard.check(req))
            .find(|verdict| !verdict.is_allowed())
            .unwrap_or(Verdict::Allow)
    }
}

/// Runs a guard as a pipeline stage; denials answer the request.
#[derive(Debug)]
pub struct GuardStage<G> {
    name: String,
    guard: G,
}

impl<G: Guard> GuardStage<G> {
    pub fn new(name: impl Into<String>, guard: G) -> Self {
        Self {
            name: name.into(),
            guard,
        }
    }
}

impl<G: Guard> RequestStage for GuardStage<G> {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply<'a>(&'a self, req: Request<Body>) -> BoxFuture<'a, StageOutcome> {
        let verdict = self.guard.check(&GuardRequest::from_request(&req));
        let outcome = match verdict {
            Verdict::Allow => ControlFlow::Continue(req),
            Verdict::Deny(denial) => {
                tracing::debug!(
                    guard = %self.name,
                    method = %req.method(),
                    path = req.uri().path(),
                    "request denied by guard"
                );
                ControlFlow::Break(denial.into_response())
            }
        };
        futures::future::ready(outcome).boxed()
    }
}
