//! Identity token verification
//!
//! A verifier turns a bearer token into a verified email address. The Google
//! implementation asks the token-info endpoint once per call, with no retries.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Identity provider reports the email as unverified")]
    Unverified,

    #[error("Token expired at {exp}")]
    Expired { exp: i64 },

    #[error("Malformed identity response: {0}")]
    MalformedResponse(String),

    #[error("Identity provider unreachable: {0}")]
    NetworkFailure(String),
}

/// Validates a bearer credential and returns the verified principal email.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, VerifyError>;
}

/// Token-info claims come back as strings, though some issuers send native
/// JSON booleans and numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Claim {
    Text(String),
    Number(i64),
    Flag(bool),
}

impl Claim {
    fn is_true(&self) -> bool {
        match self {
            Claim::Text(s) => s == "true",
            Claim::Flag(b) => *b,
            Claim::Number(_) => false,
        }
    }

    fn as_timestamp(&self) -> Option<i64> {
        match self {
            Claim::Text(s) => s.trim().parse().ok(),
            Claim::Number(n) => Some(*n),
            Claim::Flag(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<Claim>,
    #[serde(default)]
    exp: Option<Claim>,
}

/// Check decoded token-info claims against the current time.
fn check_claims(info: TokenInfo, now: i64) -> Result<String, VerifyError> {
    if !info.email_verified.as_ref().is_some_and(Claim::is_true) {
        return Err(VerifyError::Unverified);
    }

    let exp = info
        .exp
        .as_ref()
        .and_then(Claim::as_timestamp)
        .ok_or_else(|| VerifyError::MalformedResponse("exp is not an integer timestamp".into()))?;

    if exp <= now {
        return Err(VerifyError::Expired { exp });
    }

    match info.email {
        Some(email) if !email.is_empty() => Ok(email),
        _ => Err(VerifyError::MalformedResponse("email claim missing".into())),
    }
}

/// Verifies Google-issued identity tokens via the token-info endpoint.
#[derive(Clone)]
pub struct GoogleTokenVerifier {
    client: reqwest::Client,
    tokeninfo_url: String,
}

impl GoogleTokenVerifier {
    pub fn new(client: reqwest::Client, tokeninfo_url: impl Into<String>) -> Self {
        Self {
            client,
            tokeninfo_url: tokeninfo_url.into(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for GoogleTokenVerifier {
    #[instrument(skip_all)]
    async fn verify(&self, token: &str) -> Result<String, VerifyError> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| VerifyError::NetworkFailure(e.to_string()))?;

        debug!(status = %response.status(), "Token info response received");

        // Rejected tokens come back as a non-2xx JSON error body without an
        // `email_verified` claim, which fails below as Unverified.
        let body = response
            .bytes()
            .await
            .map_err(|e| VerifyError::NetworkFailure(e.to_string()))?;

        let info: TokenInfo = serde_json::from_slice(&body)
            .map_err(|e| VerifyError::MalformedResponse(e.to_string()))?;

        check_claims(info, chrono::Utc::now().timestamp())
    }
}
