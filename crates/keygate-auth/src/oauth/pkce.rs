//! PKCE (Proof Key for Code Exchange) implementation
//!
//! Implements RFC 7636 with both the `plain` and `S256` methods. The
//! challenge is validated when the authorization request is accepted; the
//! verifier is checked when the code is exchanged.
//!
//! # Example
//!
//! ```
//! use keygate_auth::oauth::{PkceChallenge, PkceChallengeMethod, PkceVerifier};
//!
//! // Client generates a verifier and challenge
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//! assert_eq!(challenge.method(), PkceChallengeMethod::S256);
//!
//! // Server stores the challenge, later verifies the verifier from the token request
//! let stored = PkceChallenge::new(challenge.as_str().to_string(), PkceChallengeMethod::S256).unwrap();
//! assert!(stored.verify(verifier.as_str()).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const MIN_LEN: usize = 43;
const MAX_LEN: usize = 128;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Challenge length is outside the valid range (43-128 characters).
    #[error("Invalid code challenge length: must be 43-128 characters, got {0}")]
    InvalidChallengeLength(usize),

    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier or challenge contains invalid characters.
    #[error("Invalid characters: must be unreserved URI characters ([A-Za-z0-9-._~])")]
    InvalidCharacters,

    /// Unsupported challenge method.
    #[error("Unsupported challenge method: {0}")]
    UnsupportedMethod(String),

    /// A challenge was stored but no verifier was presented.
    #[error("Missing code_verifier")]
    MissingVerifier,

    /// A verifier was presented for a code issued without a challenge.
    #[error("code_verifier presented but no code_challenge was sent")]
    UnexpectedVerifier,

    /// PKCE verification failed (verifier doesn't match challenge).
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Returns `true` if this error is raised at authorization time.
    #[must_use]
    pub fn is_challenge_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidChallengeLength(_) | Self::UnsupportedMethod(_)
        )
    }

    /// Get the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidChallengeLength(_)
            | Self::InvalidVerifierLength(_)
            | Self::InvalidCharacters
            | Self::UnsupportedMethod(_) => "invalid_request",
            Self::MissingVerifier | Self::UnexpectedVerifier | Self::VerificationFailed => {
                "invalid_grant"
            }
        }
    }
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceChallengeMethod {
    /// The challenge is the verifier itself.
    #[serde(rename = "plain")]
    Plain,
    /// SHA-256 hash, base64url encoded.
    S256,
}

impl PkceChallengeMethod {
    /// Parse challenge method from string.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for anything other than
    /// `plain` or `S256`.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            "plain" => Ok(Self::Plain),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RFC 7636 section 4.3: an absent method means `plain`.
impl Default for PkceChallengeMethod {
    fn default() -> Self {
        Self::Plain
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// PKCE code verifier.
///
/// A high-entropy cryptographic random string using the unreserved characters
/// `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`, with a minimum length of
/// 43 characters and a maximum length of 128 characters.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a new verifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is not between 43 and 128 characters
    /// or if it contains characters other than `[A-Za-z0-9-._~]`.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(MIN_LEN..=MAX_LEN).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }
        if !is_unreserved(&verifier) {
            return Err(PkceError::InvalidCharacters);
        }
        Ok(Self(verifier))
    }

    /// Generate a cryptographically random verifier.
    ///
    /// Generates 32 random bytes and encodes them as base64url (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        // `gen` is a reserved keyword in Rust 2024
        let bytes: [u8; 32] = rng.r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// PKCE code challenge together with its method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    challenge: String,
    method: PkceChallengeMethod,
}

impl PkceChallenge {
    /// Create an S256 challenge from a verifier.
    ///
    /// Computes `BASE64URL(SHA256(ASCII(code_verifier)))`.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self {
            challenge: s256(verifier.as_str()),
            method: PkceChallengeMethod::S256,
        }
    }

    /// Validate a challenge received in an authorization request.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is shorter than 43 or longer than 128
    /// characters, or contains characters outside the unreserved set.
    pub fn new(challenge: String, method: PkceChallengeMethod) -> Result<Self, PkceError> {
        let len = challenge.len();
        if !(MIN_LEN..=MAX_LEN).contains(&len) {
            return Err(PkceError::InvalidChallengeLength(len));
        }
        if !is_unreserved(&challenge) {
            return Err(PkceError::InvalidCharacters);
        }
        Ok(Self { challenge, method })
    }

    /// Verify the verifier presented at the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::VerificationFailed` if the verifier doesn't match.
    pub fn verify(&self, verifier: &str) -> Result<(), PkceError> {
        let matches = match self.method {
            PkceChallengeMethod::Plain => verifier.as_bytes() == self.challenge.as_bytes(),
            PkceChallengeMethod::S256 => s256(verifier).as_bytes() == self.challenge.as_bytes(),
        };
        if matches {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.challenge
    }

    #[must_use]
    pub fn method(&self) -> PkceChallengeMethod {
        self.method
    }
}

/// Checks a presented verifier against an optional stored challenge.
///
/// # Errors
///
/// Fails when a challenge exists but the verifier is missing or wrong, and
/// when a verifier is presented for a code issued without a challenge.
pub fn check_verifier(
    challenge: Option<&PkceChallenge>,
    verifier: Option<&str>,
) -> Result<(), PkceError> {
    match (challenge, verifier) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(PkceError::UnexpectedVerifier),
        (Some(_), None) => Err(PkceError::MissingVerifier),
        (Some(challenge), Some(verifier)) => challenge.verify(verifier),
    }
}

fn s256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn is_unreserved(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
}

// =============================================================================
// Tests
// =============================================================================
