//! Gate configuration.

use std::time::Duration;

use http::HeaderValue;

/// Well-known path under the pool URL where the key set is published.
const JWKS_PATH: &str = ".well-known/jwks.json";

/// Runtime configuration for the authorization gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Identity provider region, e.g. "eu-west-1".
    pub region: String,

    /// Identity pool id, e.g. "eu-west-1_AbCdEfGhI".
    pub user_pool_id: String,

    /// Expected audience (aud claim). None disables the check.
    pub audience: Option<String>,

    /// Require the iss claim to match the pool's issuer URL.
    pub validate_issuer: bool,

    /// Key set cache time-to-live in seconds.
    pub jwks_ttl_secs: u64,

    /// Clock skew tolerance in seconds for exp/nbf validation.
    pub clock_skew_secs: u64,

    /// Upper bound on the key set fetch round-trip, in seconds.
    pub http_timeout_secs: u64,

    /// Value served in Access-Control-Allow-Origin on preflight responses.
    pub cors_allow_origin: String,
}

fn default_jwks_ttl() -> u64 {
    3600 // 1 hour
}

fn default_clock_skew() -> u64 {
    30 // 30 seconds
}

fn default_http_timeout() -> u64 {
    10
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            user_pool_id: String::new(),
            audience: None,
            validate_issuer: false,
            jwks_ttl_secs: default_jwks_ttl(),
            clock_skew_secs: default_clock_skew(),
            http_timeout_secs: default_http_timeout(),
            cors_allow_origin: "*".to_string(),
        }
    }
}

impl GateConfig {
    /// Key set endpoint for the configured pool.
    ///
    /// Pure substitution into the well-known template; the values
    /// themselves are checked at the configuration boundary, not here.
    pub fn jwks_url(&self) -> String {
        format!("{}/{}", self.issuer_url(), JWKS_PATH)
    }

    /// Issuer URL the iss claim must match when issuer validation is on.
    pub fn issuer_url(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.region.is_empty() {
            return Err("region is required".to_string());
        }

        if self.user_pool_id.is_empty() {
            return Err("user pool id is required".to_string());
        }

        if HeaderValue::from_str(&self.cors_allow_origin).is_err() {
            return Err("cors allow origin is not a valid header value".to_string());
        }

        Ok(())
    }
}
