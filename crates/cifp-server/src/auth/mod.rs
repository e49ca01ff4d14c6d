//! Authorization gate for the process trigger
//!
//! Only one principal may trigger processing. The gate can be switched off
//! with `CIFP_DISABLE_AUTH`; every bypassed request is logged.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

pub mod verifier;

pub use verifier::{GoogleTokenVerifier, IdentityVerifier, VerifyError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credentials")]
    Unauthenticated,

    #[error("Access denied: {0}")]
    Forbidden(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Only a verified token for this email is allowed
    RequirePrincipal(String),
    /// Every request is allowed without verification
    Disabled,
}

/// Successful gate decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Verified { email: String },
    Bypassed,
}

impl Authorization {
    /// Identity for audit logging.
    pub fn principal(&self) -> &str {
        match self {
            Authorization::Verified { email } => email,
            Authorization::Bypassed => "<auth disabled>",
        }
    }
}

/// Token after `Bearer `, if the header has that shape and a non-empty token.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let token = header.trim().strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Clone)]
pub struct AuthGate {
    verifier: Arc<dyn IdentityVerifier>,
    policy: AuthPolicy,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, policy: AuthPolicy) -> Self {
        Self { verifier, policy }
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Decide whether the holder of `header` (the raw `Authorization` value)
    /// may trigger processing.
    pub async fn authorize(&self, header: Option<&str>) -> Result<Authorization, AuthError> {
        let allowed = match &self.policy {
            AuthPolicy::Disabled => {
                warn!("Authorization bypassed: CIFP_DISABLE_AUTH is set");
                return Ok(Authorization::Bypassed);
            },
            AuthPolicy::RequirePrincipal(email) => email,
        };

        let header = match header.map(str::trim) {
            Some(h) if !h.is_empty() => h,
            _ => return Err(AuthError::Unauthenticated),
        };

        let token = parse_bearer(header)
            .ok_or_else(|| AuthError::Forbidden("credential is not a bearer token".into()))?;

        let email = self
            .verifier
            .verify(token)
            .await
            .map_err(|e| AuthError::Forbidden(e.to_string()))?;

        if &email != allowed {
            debug!(principal = %email, "Verified principal is not allowed");
            return Err(AuthError::Forbidden(format!("principal {} is not allowed", email)));
        }

        Ok(Authorization::Verified { email })
    }
}
