//! Token verification against the cached key set.

use std::collections::HashMap;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GateConfig;
use crate::error::GateError;
use crate::jwks::{KeySetCache, SigningKey};

/// The only signature algorithm this gate accepts. The `Validation` handed
/// to the signature check is pinned to this value and never derived from
/// the token's own header.
pub const ALLOWED_ALGORITHM: Algorithm = Algorithm::RS256;

/// Decoded claim set of an accepted token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier)
    pub sub: Option<String>,
    /// Issuer
    pub iss: Option<String>,
    /// Audience (string or array)
    pub aud: Option<serde_json::Value>,
    /// Expiration time
    pub exp: Option<u64>,
    /// Not before
    pub nbf: Option<u64>,
    /// Issued at
    pub iat: Option<u64>,
    /// JWT ID
    pub jti: Option<String>,
    /// Additional claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Verify a bearer token and return its claim set.
///
/// Checks run in order and short-circuit on the first failure: compact
/// form, header decode, key lookup (which refetches the key set on a miss),
/// key conversion, algorithm allow-list, then signature and claim
/// validation.
pub async fn verify_token(
    config: &GateConfig,
    keys: &KeySetCache,
    token: &str,
) -> Result<Claims, GateError> {
    check_compact_form(token)?;

    let header = decode_header(token)?;
    let kid = header
        .kid
        .ok_or_else(|| GateError::MalformedToken("header has no kid".to_string()))?;

    debug!(kid = %kid, alg = ?header.alg, "verifying token");

    let key = keys.get(&kid).await?;
    let decoding_key = to_decoding_key(&key)?;

    if header.alg != ALLOWED_ALGORITHM {
        return Err(GateError::AlgorithmNotAllowed(format!("{:?}", header.alg)));
    }

    let validation = build_validation(config);
    let data = decode::<Claims>(token, &decoding_key, &validation)?;

    Ok(data.claims)
}

/// Exactly three non-empty dot-separated segments.
///
/// Runs before any decoding or key access, so garbage input never causes a
/// key set fetch.
fn check_compact_form(token: &str) -> Result<(), GateError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(GateError::MalformedToken(
            "expected three non-empty segments".to_string(),
        ));
    }
    Ok(())
}

/// Turn published RSA components into a verification key.
fn to_decoding_key(key: &SigningKey) -> Result<DecodingKey, GateError> {
    if key.kty != "RSA" {
        return Err(GateError::KeyConversion(format!(
            "unsupported key type: {}",
            key.kty
        )));
    }

    let n = key
        .n
        .as_ref()
        .ok_or_else(|| GateError::KeyConversion("RSA key missing 'n'".to_string()))?;
    let e = key
        .e
        .as_ref()
        .ok_or_else(|| GateError::KeyConversion("RSA key missing 'e'".to_string()))?;

    DecodingKey::from_rsa_components(n, e).map_err(|err| GateError::KeyConversion(err.to_string()))
}

fn build_validation(config: &GateConfig) -> Validation {
    let mut validation = Validation::new(ALLOWED_ALGORITHM);
    validation.leeway = config.clock_skew_secs;
    validation.validate_nbf = true;

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    if config.validate_issuer {
        validation.set_issuer(&[config.issuer_url()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
    } else {
        validation.set_required_spec_claims(&["exp"]);
    }

    validation
}
