//! Edge Authorization Gate
//!
//! Forward-auth hook for a content-delivery edge: each inbound request is
//! checked for an identity-pool-issued RS256 bearer token before it may
//! continue to origin. The edge fabric calls the hook once per request; a
//! 2xx reply means "forward the original request unchanged", any other
//! reply (401 challenge, CORS preflight) is relayed to the client as-is.

mod config;
mod error;
mod gate;
mod jwks;
mod verifier;

#[cfg(test)]
mod testutil;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use clap::Parser;
use http::StatusCode;
use tracing::info;

use config::GateConfig;
use gate::{Gate, GateDecision};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "edge-auth-gate")]
#[command(about = "Bearer-token authorization gate for CDN edge requests")]
struct Args {
    /// Address the hook listens on
    #[arg(long, default_value = "127.0.0.1:8900", env = "GATE_LISTEN")]
    listen: SocketAddr,

    /// Identity provider region
    #[arg(long, env = "AWS_REGION")]
    region: String,

    /// Identity pool id
    #[arg(long, env = "USER_POOL_ID")]
    user_pool_id: String,

    /// Audience (aud claim) to enforce; unset disables the check
    #[arg(long, env = "GATE_AUDIENCE")]
    audience: Option<String>,

    /// Require the iss claim to match the pool's issuer URL
    #[arg(long, env = "GATE_VALIDATE_ISSUER")]
    validate_issuer: bool,

    /// Key set cache time-to-live in seconds
    #[arg(long, default_value_t = 3600, env = "GATE_JWKS_TTL")]
    jwks_ttl_secs: u64,

    /// Clock skew tolerance in seconds for exp/nbf validation
    #[arg(long, default_value_t = 30, env = "GATE_CLOCK_SKEW")]
    clock_skew_secs: u64,

    /// Upper bound on the key set fetch round-trip in seconds
    #[arg(long, default_value_t = 10, env = "GATE_HTTP_TIMEOUT")]
    http_timeout_secs: u64,

    /// Origin served in preflight Access-Control-Allow-Origin
    #[arg(long, default_value = "*", env = "GATE_CORS_ORIGIN")]
    cors_allow_origin: String,

    /// Enable verbose logging
    #[arg(short, long, env = "GATE_VERBOSE")]
    verbose: bool,
}

impl Args {
    fn gate_config(&self) -> GateConfig {
        GateConfig {
            region: self.region.clone(),
            user_pool_id: self.user_pool_id.clone(),
            audience: self.audience.clone(),
            validate_issuer: self.validate_issuer,
            jwks_ttl_secs: self.jwks_ttl_secs,
            clock_skew_secs: self.clock_skew_secs,
            http_timeout_secs: self.http_timeout_secs,
            cors_allow_origin: self.cors_allow_origin.clone(),
        }
    }
}

fn router(gate: Arc<Gate>) -> Router {
    Router::new().fallback(handle).with_state(gate)
}

/// Map a gate decision onto the hook's HTTP surface.
async fn handle(State(gate): State<Arc<Gate>>, request: Request) -> Response {
    match gate.check(request.method(), request.headers()).await {
        GateDecision::Forward => StatusCode::NO_CONTENT.into_response(),
        GateDecision::Respond(response) => response.into_response(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .json()
        .init();

    info!("starting edge auth gate");

    let config = args.gate_config();
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;

    info!(
        jwks_url = %config.jwks_url(),
        jwks_ttl_secs = config.jwks_ttl_secs,
        audience_check = config.audience.is_some(),
        issuer_check = config.validate_issuer,
        "configuration loaded"
    );

    let gate = Arc::new(Gate::new(config)?);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(listen = %args.listen, "gate hook listening");

    axum::serve(listener, router(gate))
        .await
        .context("server error")?;

    Ok(())
}
