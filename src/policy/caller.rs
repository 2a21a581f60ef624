use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identity a data-access call runs as. It is always passed explicitly;
/// the store keeps no session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Caller {
    /// Unauthenticated request. Only unconditional policies apply.
    Anonymous,
    /// A subject authenticated by the auth provider.
    User(Uuid),
    /// Elevated role used by the billing and auth collaborators. Bypasses
    /// row-level security.
    Service,
}

impl Caller {
    pub const fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User(id) => Some(*id),
            Self::Anonymous | Self::Service => None,
        }
    }

    pub const fn is_service(&self) -> bool {
        matches!(self, Self::Service)
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::Service => f.write_str("service"),
        }
    }
}
