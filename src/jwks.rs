//! Key set retrieval and caching.
//!
//! The identity provider publishes its current public signing keys as a
//! JWKS document at a well-known URL. [`KeySetCache`] fetches that document,
//! indexes it by key id, and serves lookups from the cached index until the
//! TTL lapses or a lookup misses (the signal that the provider rotated its
//! keys).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::GateError;

/// Key set document as published at the well-known endpoint.
#[derive(Debug, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<SigningKey>,
}

/// One published signing key.
///
/// Only the material RS256 verification consumes is retained; entries of
/// other key types (EC curve points and the like) still deserialize, their
/// extra fields are simply ignored, and conversion rejects them later.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningKey {
    /// Key type (RSA, EC)
    pub kty: String,
    /// Key ID
    pub kid: Option<String>,
    /// Algorithm
    pub alg: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,
}

/// Kid-indexed snapshot of one fetched key set.
type KeyIndex = HashMap<String, SigningKey>;

/// Index a fetched document by key id.
///
/// Encryption keys and keys without a kid cannot serve lookups and are
/// skipped; on duplicate kids the first occurrence wins.
fn index_keys(document: JwksDocument) -> KeyIndex {
    let mut index = KeyIndex::new();

    for key in document.keys {
        if key.key_use.as_deref() == Some("enc") {
            continue;
        }

        let Some(kid) = key.kid.clone() else {
            warn!(kty = %key.kty, "skipping key without kid");
            continue;
        };

        debug!(kid = %kid, kty = %key.kty, alg = ?key.alg, "indexed signing key");
        index.entry(kid).or_insert(key);
    }

    index
}

/// Cached key set with TTL refresh and refetch on key-id miss.
///
/// Readers share the current index behind an `RwLock` and always observe
/// either the old or the fully-replaced new set. Refreshes serialize on a
/// dedicated mutex so concurrent misses produce a single upstream fetch.
pub struct KeySetCache {
    /// Current index: kid -> SigningKey
    keys: RwLock<KeyIndex>,
    /// When the index was last replaced; None until the first fetch.
    fetched_at: RwLock<Option<Instant>>,
    /// Serializes refreshes across concurrent callers.
    refresh_lock: Mutex<()>,
    /// Staleness bound for the cached index.
    ttl: Duration,
    /// Key set endpoint URL
    jwks_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl KeySetCache {
    /// Create an empty cache; the first lookup populates it.
    pub fn new(
        jwks_url: String,
        ttl: Duration,
        http_timeout: Duration,
    ) -> Result<Self, GateError> {
        let http_client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| GateError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            keys: RwLock::new(KeyIndex::new()),
            fetched_at: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            ttl,
            jwks_url,
            http_client,
        })
    }

    /// Look up a signing key by key id.
    ///
    /// A stale cache is refreshed before lookup; a miss against a fresh
    /// cache triggers one more refresh to pick up rotated keys before the
    /// lookup is declared failed.
    pub async fn get(&self, kid: &str) -> Result<SigningKey, GateError> {
        if !self.is_stale().await {
            if let Some(key) = self.lookup(kid).await {
                return Ok(key);
            }
            debug!(kid = %kid, "key not in cache, refreshing key set");
        }

        self.refresh().await?;

        self.lookup(kid)
            .await
            .ok_or_else(|| GateError::KeyNotFound { kid: kid.to_string() })
    }

    async fn lookup(&self, kid: &str) -> Option<SigningKey> {
        self.keys.read().await.get(kid).cloned()
    }

    async fn is_stale(&self) -> bool {
        match *self.fetched_at.read().await {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    /// Fetch the key set and replace the index wholesale.
    ///
    /// Single-flight: callers that waited on the refresh lock while another
    /// refresh completed reuse its result instead of fetching again.
    async fn refresh(&self) -> Result<(), GateError> {
        let observed = *self.fetched_at.read().await;
        let _guard = self.refresh_lock.lock().await;

        if *self.fetched_at.read().await != observed {
            return Ok(());
        }

        let document = self.fetch().await?;
        let index = index_keys(document);
        if index.is_empty() {
            return Err(GateError::MalformedKeySet(
                "no usable signing keys".to_string(),
            ));
        }

        info!(url = %self.jwks_url, key_count = index.len(), "key set refreshed");

        *self.keys.write().await = index;
        *self.fetched_at.write().await = Some(Instant::now());

        Ok(())
    }

    /// One buffered GET of the key set document.
    async fn fetch(&self) -> Result<JwksDocument, GateError> {
        debug!(url = %self.jwks_url, "fetching key set");

        let response = match self.http_client.get(&self.jwks_url).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() || err.is_connect() => {
                // one retry for transient transport failures; anything
                // beyond that fails closed
                warn!(error = %err, "key set fetch failed, retrying once");
                self.http_client
                    .get(&self.jwks_url)
                    .send()
                    .await
                    .map_err(|e| {
                        GateError::Network(format!("key set fetch failed after retry: {e}"))
                    })?
            },
            Err(err) => {
                return Err(GateError::Network(format!("key set fetch failed: {err}")));
            },
        };

        let status = response.status();
        if !status.is_success() {
            return Err(GateError::Network(format!(
                "key set endpoint returned status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GateError::Network(format!("failed to read key set body: {e}")))?;

        serde_json::from_str(&body).map_err(|e| GateError::MalformedKeySet(e.to_string()))
    }
}
