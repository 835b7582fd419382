//! Request gate: the per-request decision between forwarding and rejecting.
//!
//! Preflight requests are answered directly; everything else must present a
//! verifiable bearer token. Whatever stage a verification fails at, the
//! client sees the same 401 challenge — the distinctions stay in the logs.

use axum::response::{IntoResponse, Response};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, AUTHORIZATION, WWW_AUTHENTICATE,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tracing::{debug, warn};

use crate::config::GateConfig;
use crate::error::GateError;
use crate::jwks::KeySetCache;
use crate::verifier::{verify_token, Claims};

/// Scheme expected in the Authorization header.
const BEARER_PREFIX: &str = "Bearer ";

/// Outcome of gating one request.
#[derive(Debug)]
pub enum GateDecision {
    /// Token accepted: the edge forwards the original request unchanged.
    Forward,
    /// Short-circuit with this synthetic response.
    Respond(GateResponse),
}

/// Synthetic response returned to the client without reaching origin.
#[derive(Debug)]
pub struct GateResponse {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, String)>,
}

impl IntoResponse for GateResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(name, value);
                },
                Err(_) => warn!(header = %name, "dropping invalid header value"),
            }
        }
        (self.status, headers).into_response()
    }
}

/// The authorization gate: key set provider and token verifier behind one
/// per-request entry point.
pub struct Gate {
    config: GateConfig,
    keys: KeySetCache,
}

impl Gate {
    /// Build a gate whose key set endpoint derives from the configuration.
    pub fn new(config: GateConfig) -> Result<Self, GateError> {
        let keys = KeySetCache::new(config.jwks_url(), config.jwks_ttl(), config.http_timeout())?;
        Ok(Self::with_key_cache(config, keys))
    }

    /// Build a gate around an existing key set cache.
    pub fn with_key_cache(config: GateConfig, keys: KeySetCache) -> Self {
        Self { config, keys }
    }

    /// Gate one request.
    ///
    /// Preflight requests are answered before any authorization work. Each
    /// request is evaluated independently; a failure here never carries
    /// state into the next call beyond the key cache itself.
    pub async fn check(&self, method: &Method, headers: &HeaderMap) -> GateDecision {
        if method == Method::OPTIONS {
            debug!("answering preflight");
            return GateDecision::Respond(self.preflight_response());
        }

        match self.authorize(headers).await {
            Ok(claims) => {
                debug!(sub = claims.sub.as_deref().unwrap_or("-"), "token accepted");
                GateDecision::Forward
            },
            Err(err) => {
                // log the stage that rejected; the client always sees the
                // same challenge
                debug!(error = %err, "request rejected");
                GateDecision::Respond(unauthorized_response())
            },
        }
    }

    async fn authorize(&self, headers: &HeaderMap) -> Result<Claims, GateError> {
        let token = bearer_token(headers)?;
        verify_token(&self.config, &self.keys, token).await
    }

    fn preflight_response(&self) -> GateResponse {
        GateResponse {
            status: StatusCode::OK,
            headers: vec![
                (
                    ACCESS_CONTROL_ALLOW_ORIGIN,
                    self.config.cors_allow_origin.clone(),
                ),
                (ACCESS_CONTROL_ALLOW_METHODS, "GET, HEAD, PUT".to_string()),
                (
                    ACCESS_CONTROL_ALLOW_HEADERS,
                    "Authorization, Content-Type, x-amz-*".to_string(),
                ),
                (ACCESS_CONTROL_MAX_AGE, "86400".to_string()),
            ],
        }
    }
}

fn unauthorized_response() -> GateResponse {
    GateResponse {
        status: StatusCode::UNAUTHORIZED,
        headers: vec![(WWW_AUTHENTICATE, "Bearer".to_string())],
    }
}

/// Extract the bearer token from the Authorization header.
///
/// The scheme prefix is matched literally; an absent or empty header is
/// distinguished from a present-but-wrong one.
fn bearer_token(headers: &HeaderMap) -> Result<&str, GateError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(GateError::AuthHeaderMissing)?;
    let value = value.to_str().map_err(|_| GateError::AuthHeaderMalformed)?;

    if value.is_empty() {
        return Err(GateError::AuthHeaderMissing);
    }

    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(GateError::AuthHeaderMalformed)?;
    if token.is_empty() {
        return Err(GateError::AuthHeaderMalformed);
    }

    Ok(token)
}
