//! Envelope error taxonomy.
//!
//! Every variant here is a contract violation by the integrating code, not a
//! runtime condition an end user can trigger. Validation problems are data
//! (see [`FieldErrors`](crate::FieldErrors)), not errors.

use thiserror::Error;

/// Errors raised while building or mutating an [`Envelope`](crate::Envelope).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The severity is not one of `error`, `info`, `success`, `warning`.
    #[error("support for message type `{0}` not available")]
    InvalidSeverity(String),

    /// Identity enrichment was requested without an identity source.
    #[error("identity enrichment requires an identity source")]
    MissingIdentitySource,

    /// An extra field tried to use a key the envelope owns.
    #[error("`{0}` is a reserved envelope field")]
    ReservedField(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            EnvelopeError::InvalidSeverity("fatal".into()).to_string(),
            "support for message type `fatal` not available"
        );
        assert_eq!(
            EnvelopeError::ReservedField("messages".into()).to_string(),
            "`messages` is a reserved envelope field"
        );
    }
}
