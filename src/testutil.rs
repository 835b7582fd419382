//! Test fixtures: a mock identity provider publishing a generated key set.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use openssl::pkey::Private;
use openssl::rsa::Rsa;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::GateConfig;
use crate::jwks::KeySetCache;

/// Kid of the single key the mock provider publishes.
pub const TEST_KID: &str = "test-key-1";

/// Mock identity provider: one RSA keypair exposed as a key set document,
/// plus helpers to mint tokens signed (or mis-signed) against it.
pub struct MockIdp {
    server: MockServer,
    rsa: Rsa<Private>,
}

impl MockIdp {
    /// Start with the key set endpoint answering any number of times.
    pub async fn start() -> Self {
        Self::start_inner(None).await
    }

    /// Start with an exact expectation on the number of key set fetches,
    /// verified when the server drops.
    pub async fn start_expecting(hits: u64) -> Self {
        Self::start_inner(Some(hits)).await
    }

    async fn start_inner(hits: Option<u64>) -> Self {
        let rsa = Rsa::generate(2048).unwrap();
        let server = MockServer::start().await;

        let mut mock = Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&rsa)));
        if let Some(hits) = hits {
            mock = mock.expect(hits);
        }
        mock.mount(&server).await;

        Self { server, rsa }
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.server.uri())
    }

    /// Cache pointed at this provider, with a TTL long enough that tests
    /// control every refetch themselves.
    pub fn key_cache(&self) -> KeySetCache {
        KeySetCache::new(
            self.jwks_url(),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    /// Gate configuration with all optional claim checks off.
    pub fn config(&self) -> GateConfig {
        GateConfig {
            region: "eu-west-1".to_string(),
            user_pool_id: "eu-west-1_TestPool".to_string(),
            ..GateConfig::default()
        }
    }

    /// Mint an RS256 token signed by the published key.
    pub fn token(&self, claims: serde_json::Value) -> String {
        self.token_with_kid(TEST_KID, claims)
    }

    /// Mint an RS256 token declaring an arbitrary kid.
    pub fn token_with_kid(&self, kid: &str, claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        self.sign(&header, &claims)
    }

    /// Mint an RS256 token whose header carries no kid at all.
    pub fn token_without_kid(&self, claims: serde_json::Value) -> String {
        self.sign(&Header::new(Algorithm::RS256), &claims)
    }

    /// Mint a token signed by a keypair the provider never published, but
    /// still declaring the published kid.
    pub fn token_foreign_key(&self, claims: serde_json::Value) -> String {
        let other = Rsa::generate(2048).unwrap();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(TEST_KID.to_string());
        let key = EncodingKey::from_rsa_der(&other.private_key_to_der().unwrap());
        jsonwebtoken::encode(&header, &claims, &key).unwrap()
    }

    /// Mint an HS256 token that still claims the published kid.
    pub fn token_hs256(&self, claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(TEST_KID.to_string());
        let key = EncodingKey::from_secret(b"not-an-rsa-key");
        jsonwebtoken::encode(&header, &claims, &key).unwrap()
    }

    fn sign(&self, header: &Header, claims: &serde_json::Value) -> String {
        let key = EncodingKey::from_rsa_der(&self.rsa.private_key_to_der().unwrap());
        jsonwebtoken::encode(header, claims, &key).unwrap()
    }

    /// An expiry comfortably in the future.
    pub fn future_exp() -> u64 {
        now_secs() + 3600
    }

    /// An expiry well past any leeway.
    pub fn past_exp() -> u64 {
        now_secs() - 3600
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn jwks_body(rsa: &Rsa<Private>) -> serde_json::Value {
    serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "kid": TEST_KID,
            "alg": "RS256",
            "use": "sig",
            "n": URL_SAFE_NO_PAD.encode(rsa.n().to_vec()),
            "e": URL_SAFE_NO_PAD.encode(rsa.e().to_vec()),
        }]
    })
}
