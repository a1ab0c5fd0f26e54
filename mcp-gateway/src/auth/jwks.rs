//! Remote JSON Web Key Set attached to a discovered issuer.

use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::Algorithm;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

/// Minimum spacing between refetches triggered by an unknown `kid`
pub const REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

pub type KeySetHandle = Arc<RemoteKeySet>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeySetError {
    #[error("failed to fetch key set from {uri}: {reason}")]
    Fetch { uri: String, reason: String },

    #[error("no signing key matches kid '{0}'")]
    UnknownKid(String),

    #[error("key set contains no signing keys")]
    Empty,

    #[error("no kid given and no signing key declares {0:?}")]
    NoKeyForAlgorithm(Algorithm),
}

#[derive(Debug, Clone)]
struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Key set fetched lazily from a `jwks_uri` and refetched when a token
/// names a key it has not seen yet.
#[derive(Debug)]
pub struct RemoteKeySet {
    jwks_uri: Url,
    client: reqwest::Client,
    refresh_cooldown: Duration,
    cached: RwLock<Option<CachedKeys>>,
}

impl RemoteKeySet {
    pub fn new(jwks_uri: Url, client: reqwest::Client) -> Self {
        Self {
            jwks_uri,
            client,
            refresh_cooldown: REFRESH_COOLDOWN,
            cached: RwLock::new(None),
        }
    }

    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// The key that signed a token whose header names `kid` and `alg`.
    ///
    /// Without a `kid` a lone signing key is used, otherwise the first
    /// signing key declaring `alg`.
    pub async fn signing_key(
        &self,
        kid: Option<&str>,
        alg: Algorithm,
    ) -> Result<Jwk, KeySetError> {
        let (keys, fetched_at) = match self.snapshot().await {
            Some(cached) => (cached.keys, cached.fetched_at),
            None => (self.fetch().await?, Instant::now()),
        };

        let Some(kid) = kid else {
            return select_without_kid(keys, alg);
        };

        if let Some(jwk) = find_signing(&keys, kid) {
            return Ok(jwk);
        }

        if fetched_at.elapsed() < self.refresh_cooldown {
            debug!(
                "kid '{}' not in key set from {}, refetch suppressed",
                kid, self.jwks_uri
            );
            return Err(KeySetError::UnknownKid(kid.to_string()));
        }

        info!(
            "kid '{}' not in key set from {}, refetching",
            kid, self.jwks_uri
        );
        let keys = self.fetch().await?;
        find_signing(&keys, kid).ok_or_else(|| KeySetError::UnknownKid(kid.to_string()))
    }

    async fn snapshot(&self) -> Option<CachedKeys> {
        self.cached.read().await.clone()
    }

    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        let fetch_error = |reason: String| KeySetError::Fetch {
            uri: self.jwks_uri.to_string(),
            reason,
        };

        let response = self
            .client
            .get(self.jwks_uri.clone())
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            warn!(
                "Key set endpoint {} returned status {}",
                self.jwks_uri,
                response.status()
            );
            return Err(fetch_error(format!("status {}", response.status())));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| fetch_error(format!("invalid key set: {e}")))?;

        debug!(
            "Fetched {} key(s) from {}",
            keys.keys.len(),
            self.jwks_uri
        );

        *self.cached.write().await = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }
}

fn is_signing_key(jwk: &Jwk) -> bool {
    !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
}

fn find_signing(keys: &JwkSet, kid: &str) -> Option<Jwk> {
    keys.find(kid).filter(|jwk| is_signing_key(jwk)).cloned()
}

fn declares_alg(jwk: &Jwk, alg: Algorithm) -> bool {
    jwk.common
        .key_algorithm
        .as_ref()
        .is_some_and(|declared| format!("{declared:?}") == format!("{alg:?}"))
}

fn select_without_kid(keys: JwkSet, alg: Algorithm) -> Result<Jwk, KeySetError> {
    let mut signing: Vec<Jwk> = keys.keys.into_iter().filter(is_signing_key).collect();
    match signing.len() {
        0 => Err(KeySetError::Empty),
        1 => Ok(signing.remove(0)),
        _ => signing
            .into_iter()
            .find(|jwk| declares_alg(jwk, alg))
            .ok_or(KeySetError::NoKeyForAlgorithm(alg)),
    }
}
