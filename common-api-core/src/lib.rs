//! Core types for common-api.
//!
//! This crate is framework independent; the `common-api` crate wires these
//! types into axum.
//!
//! ## Modules
//!
//! - `envelope`: Response envelope builder
//! - `message`: Severity buckets and message records
//! - `form`: Field errors and the JSON form base
//! - `pagination`: Paginator/page cursor contracts
//! - `identity`: Identity source contract
//! - `validators`: Username and phone number validators
//! - `serialize`: Typed field serializer

mod envelope;
mod error;
mod form;
mod identity;
mod message;
mod pagination;
mod serialize;
mod validators;

pub use envelope::*;
pub use error::*;
pub use form::*;
pub use identity::*;
pub use message::*;
pub use pagination::*;
pub use serialize::*;
pub use validators::*;
