//! Process-wide configuration for request stages.
//!
//! Set once at startup and copied into each stage; nothing here changes per
//! request.

/// Form field the anti-forgery token is published under.
pub const DEFAULT_TOKEN_FIELD: &str = "csrfmiddlewaretoken";

/// Cookie (and JSON body field) carrying the session key.
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "sessionid";

/// Default cap on bodies read by the normalizer (2.5 MiB).
pub const DEFAULT_RECEIVE_MAX_BYTES: usize = 2_621_440;

/// Which requests the normalizer tries to parse as JSON.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Only bodies declared as `application/json` (or a `+json` type).
    #[default]
    ContentType,
    /// Any body-carrying request that does not carry multipart file uploads.
    AnyBody,
}

/// Configuration for [`JsonBodyNormalizer`](crate::JsonBodyNormalizer).
///
/// # Example
///
/// ```rust
/// use common_api::{NormalizerConfig, ParseMode};
///
/// let config = NormalizerConfig::new()
///     .token_field("_token")
///     .mode(ParseMode::AnyBody)
///     .receive_max_bytes(Some(64 * 1024));
/// assert_eq!(config.get_token_field(), "_token");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizerConfig {
    token_field: String,
    mode: ParseMode,
    receive_max_bytes: Option<usize>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            token_field: DEFAULT_TOKEN_FIELD.to_string(),
            mode: ParseMode::default(),
            receive_max_bytes: Some(DEFAULT_RECEIVE_MAX_BYTES),
        }
    }
}

impl NormalizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the JSON field copied into [`FormFields`](crate::FormFields).
    pub fn token_field(mut self, name: impl Into<String>) -> Self {
        self.token_field = name.into();
        self
    }

    pub fn mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Maximum body size the normalizer will buffer. `None` means unlimited.
    ///
    /// Requests declaring a larger `Content-Length` are left unread.
    pub fn receive_max_bytes(mut self, max: Option<usize>) -> Self {
        self.receive_max_bytes = max;
        self
    }

    pub fn get_token_field(&self) -> &str {
        &self.token_field
    }

    pub fn get_mode(&self) -> ParseMode {
        self.mode
    }

    pub fn get_receive_max_bytes(&self) -> Option<usize> {
        self.receive_max_bytes
    }

    /// Limit for `axum::body::to_bytes`; `usize::MAX` if unlimited.
    pub fn receive_max_bytes_or_max(&self) -> usize {
        self.receive_max_bytes.unwrap_or(usize::MAX)
    }

    /// `true` if a declared length is above the configured limit.
    pub fn exceeds_limit(&self, size: usize) -> bool {
        matches!(self.receive_max_bytes, Some(max) if size > max)
    }
}

/// Configuration for [`SessionKeyStage`](crate::SessionKeyStage).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_COOKIE_NAME.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn get_cookie_name(&self) -> &str {
        &self.cookie_name
    }
}
