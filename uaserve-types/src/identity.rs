//! Identity tokens presented at session activation.

use serde::{Deserialize, Serialize};

/// The identity a client asserts when activating a session.
///
/// Compared for equality during session transfer: a transfer that presents a
/// different identity than the one the session was activated with is
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IdentityToken {
    Anonymous,
    UserName { user_name: String, password: String },
    X509 { certificate_data: Vec<u8> },
}

impl Default for IdentityToken {
    fn default() -> Self {
        IdentityToken::Anonymous
    }
}

impl IdentityToken {
    /// Returns the token kind name, for logging. Never includes credentials.
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityToken::Anonymous => "anonymous",
            IdentityToken::UserName { .. } => "username",
            IdentityToken::X509 { .. } => "x509",
        }
    }
}
