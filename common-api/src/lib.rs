//! # common-api
//!
//! Shared request handling for JSON APIs built with [Axum](https://github.com/tokio-rs/axum).
//!
//! Every response is a uniform envelope: severity-bucketed messages, field
//! errors, an error flag, optional pagination and caller identity flags.
//! Incoming requests run through an ordered [`Pipeline`] that can normalize
//! JSON bodies, resolve the session key and apply access guards before the
//! handler sees them.
//!
//! ## Features
//!
//! - **Envelope:** [`Envelope`] collects messages and field errors and is
//!   finalized into one JSON object. [`EnvelopeExt::respond`] turns it into
//!   an axum response.
//! - **Body normalization:** [`JsonBodyNormalizer`] parses JSON bodies once
//!   and exposes them through [`JsonData`], leaving the raw body readable.
//! - **Session keys:** [`SessionKeyStage`] reads the key from the session
//!   cookie or from the JSON body.
//! - **Guards:** [`LoginRequired`], [`LogoutRequired`], [`AjaxOnly`],
//!   [`AllowedMethods`] and [`UserPassesTest`] answer denied requests with a
//!   warning envelope.
//!
//! ## Getting Started
//!
//! ```rust,ignore
//! use axum::{Router, routing::post};
//! use common_api::prelude::*;
//!
//! async fn login(JsonData(data): JsonData) -> EnvelopeResponse {
//!     let mut envelope = Envelope::new();
//!     envelope.add_success_message("Welcome", "Logged in");
//!     envelope.respond()
//! }
//!
//! let app = Router::new().route("/login", post(login)).layer(PipelineLayer::new(
//!     Pipeline::new()
//!         .stage(JsonBodyNormalizer::new())
//!         .stage(SessionKeyStage::new())
//!         .stage(GuardStage::new("logout_required", LogoutRequired::default())),
//! ));
//! ```

pub mod config;
pub mod extract;
pub mod guard;
pub mod layer;
pub mod normalize;
pub mod pipeline;
pub mod response;
pub mod session;

pub use config::{
    DEFAULT_RECEIVE_MAX_BYTES, DEFAULT_SESSION_COOKIE_NAME, DEFAULT_TOKEN_FIELD, NormalizerConfig,
    ParseMode, SessionConfig,
};
pub use extract::{BodyState, CurrentUser, FormFields, JsonBody, JsonData, SessionKey};
pub use guard::{
    AjaxOnly, AllowedMethods, Denial, FnGuard, Guard, GuardChain, GuardRequest, GuardStage,
    LoginRequired, LogoutRequired, UserPassesTest, Verdict, guard_fn,
};
pub use layer::{PipelineLayer, PipelineService};
pub use normalize::{BodyKind, JsonBodyNormalizer};
pub use pipeline::{Pipeline, RequestStage, StageOutcome};
pub use response::{EnvelopeExt, EnvelopeResponse};
pub use session::SessionKeyStage;

pub use common_api_core::{
    AnonymousUser, Envelope, EnvelopeBuilder, EnvelopeError, FieldErrors, FieldSerializer,
    FormField, IdentityFlags, IdentitySource, JsonForm, Message, Messages, Page, PageCursor,
    Pagination, Paginator, PhoneNumberValidator, Severity, StaticIdentity, UsernameValidator,
    ValidatedForm, ValidationError, Validator,
};

// Re-export several crates
pub use futures;
pub use http;
pub use serde;
pub use serde_json;

pub mod prelude {
    //! The types most handlers need.
    pub use crate::extract::{CurrentUser, FormFields, JsonData, SessionKey};
    pub use crate::guard::{
        AjaxOnly, AllowedMethods, Denial, Guard, GuardChain, GuardRequest, GuardStage,
        LoginRequired, LogoutRequired, UserPassesTest, Verdict,
    };
    pub use crate::layer::PipelineLayer;
    pub use crate::normalize::JsonBodyNormalizer;
    pub use crate::pipeline::Pipeline;
    pub use crate::response::{EnvelopeExt, EnvelopeResponse};
    pub use crate::session::SessionKeyStage;
    pub use common_api_core::{Envelope, JsonForm, Page, Severity, ValidatedForm};
}
