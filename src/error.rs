//! Gate error types.
//!
//! Every failure in the verification pipeline maps to one variant here. The
//! gate boundary collapses all of them into a single 401 challenge, so the
//! distinctions only drive logging and the key-cache refresh policy.

use thiserror::Error;

/// Failures raised while resolving the key set or verifying a token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GateError {
    /// Key set retrieval failed: connection error, timeout, or a
    /// non-success status from the endpoint.
    #[error("key set fetch failed: {0}")]
    Network(String),

    /// Key set response body does not match the expected structure.
    #[error("malformed key set: {0}")]
    MalformedKeySet(String),

    /// Token is not a well-formed three-segment JWT, or its header is
    /// undecodable or lacks a key id.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// No key in the current key set matches the token's key id.
    #[error("no key with kid '{kid}' in key set")]
    KeyNotFound {
        /// Key id the token asked for.
        kid: String,
    },

    /// Matched key material could not be turned into a public key.
    #[error("unusable key material: {0}")]
    KeyConversion(String),

    /// Token header declares an algorithm outside the allow-list.
    #[error("algorithm not allowed: {0}")]
    AlgorithmNotAllowed(String),

    /// Signature does not verify under the selected key.
    #[error("invalid signature")]
    SignatureInvalid,

    /// Signature is valid but a claim check failed (expired, premature,
    /// wrong issuer or audience).
    #[error("claim validation failed: {0}")]
    ClaimInvalid(String),

    /// Request carries no Authorization header, or an empty one.
    #[error("missing authorization header")]
    AuthHeaderMissing,

    /// Authorization header is not `Bearer <token>`.
    #[error("malformed authorization header")]
    AuthHeaderMalformed,
}

impl From<jsonwebtoken::errors::Error> for GateError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::Json(_) => GateError::MalformedToken(err.to_string()),
            ErrorKind::InvalidSignature => GateError::SignatureInvalid,
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                GateError::KeyConversion(err.to_string())
            },
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                GateError::AlgorithmNotAllowed(err.to_string())
            },
            ErrorKind::ExpiredSignature => GateError::ClaimInvalid("token expired".into()),
            ErrorKind::ImmatureSignature => {
                GateError::ClaimInvalid("token not yet valid".into())
            },
            ErrorKind::InvalidIssuer => GateError::ClaimInvalid("issuer mismatch".into()),
            ErrorKind::InvalidAudience => GateError::ClaimInvalid("audience mismatch".into()),
            ErrorKind::MissingRequiredClaim(claim) => {
                GateError::ClaimInvalid(format!("missing claim: {claim}"))
            },
            _ => GateError::MalformedToken(format!("token rejected: {err}")),
        }
    }
}
