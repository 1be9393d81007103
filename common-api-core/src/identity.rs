//! Identity queries consumed by envelopes and guards.

use serde::{Deserialize, Serialize};

/// The current user, as seen by the host's session/auth subsystem.
pub trait IdentitySource: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// Only meaningful when [`is_authenticated`](Self::is_authenticated) is true.
    fn is_superuser(&self) -> bool;
}

/// A user that is not logged in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnonymousUser;

impl IdentitySource for AnonymousUser {
    fn is_authenticated(&self) -> bool {
        false
    }

    fn is_superuser(&self) -> bool {
        false
    }
}

/// A fixed identity, handy for hosts that resolve the user up front.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaticIdentity {
    pub authenticated: bool,
    pub superuser: bool,
}

impl StaticIdentity {
    pub fn user() -> Self {
        Self {
            authenticated: true,
            superuser: false,
        }
    }

    pub fn superuser() -> Self {
        Self {
            authenticated: true,
            superuser: true,
        }
    }
}

impl IdentitySource for StaticIdentity {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn is_superuser(&self) -> bool {
        self.superuser
    }
}

/// `is_logged_in` / `is_superuser` flags written into the envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFlags {
    pub is_logged_in: bool,
    pub is_superuser: bool,
}

impl IdentityFlags {
    /// Query `source`; `is_superuser` is only asked for authenticated users.
    pub fn lookup(source: &dyn IdentitySource) -> Self {
        let is_logged_in = source.is_authenticated();
        Self {
            is_logged_in,
            is_superuser: is_logged_in && source.is_superuser(),
        }
    }
}
