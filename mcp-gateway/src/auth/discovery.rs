//! Issuer metadata discovery with a TTL cache.

use super::issuer::normalize_issuer;
use super::jwks::{KeySetHandle, RemoteKeySet};
use super::AuthError;
use http::header::ACCEPT;
use log::{debug, info, warn};
use moka::future::Cache as MokaCache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// How long a discovered issuer stays cached
pub const DISCOVERY_TTL: Duration = Duration::from_secs(60 * 60);

const OPENID_CONFIGURATION: &str = "/.well-known/openid-configuration";
const OAUTH_AUTHORIZATION_SERVER: &str = "/.well-known/oauth-authorization-server";

/// Discovery result for one issuer
#[derive(Debug, Clone)]
pub struct DiscoveryRecord {
    pub issuer: String,
    pub jwks_uri: Url,
    pub key_set: KeySetHandle,
}

#[derive(Debug, Deserialize)]
struct ProviderMetadata {
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    jwks_uri: Option<String>,
}

/// Per-issuer discovery cache.
///
/// Concurrent misses for the same issuer each run discovery and the last
/// write wins.
#[derive(Clone)]
pub struct DiscoveryCache {
    records: MokaCache<String, DiscoveryRecord>,
    client: reqwest::Client,
}

impl DiscoveryCache {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_ttl(timeout, DISCOVERY_TTL)
    }

    pub fn with_ttl(timeout: Duration, ttl: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            records: MokaCache::builder().time_to_live(ttl).build(),
            client,
        })
    }

    /// Key set of an issuer, discovering it on a cache miss
    pub async fn keys_for(&self, issuer: &str) -> Result<KeySetHandle, AuthError> {
        Ok(self.record(issuer).await?.key_set)
    }

    pub async fn record(&self, issuer: &str) -> Result<DiscoveryRecord, AuthError> {
        let issuer = normalize_issuer(issuer);
        if let Some(record) = self.records.get(&issuer).await {
            debug!("Discovery cache hit for {}", issuer);
            return Ok(record);
        }

        let record = self.discover(&issuer).await.map_err(|reason| {
            warn!("Discovery failed for {}: {}", issuer, reason);
            AuthError::Discovery {
                issuer: issuer.clone(),
                reason,
            }
        })?;
        self.records.insert(issuer, record.clone()).await;
        Ok(record)
    }

    async fn discover(&self, issuer: &str) -> Result<DiscoveryRecord, String> {
        let metadata = match self.fetch_metadata(issuer, OPENID_CONFIGURATION).await {
            Ok(metadata) => metadata,
            Err(oidc_error) => {
                debug!(
                    "OpenID configuration unavailable for {} ({}), trying OAuth metadata",
                    issuer, oidc_error
                );
                self.fetch_metadata(issuer, OAUTH_AUTHORIZATION_SERVER)
                    .await
                    .map_err(|oauth_error| {
                        format!("openid-configuration: {oidc_error}; oauth-authorization-server: {oauth_error}")
                    })?
            }
        };

        if let Some(advertised) = metadata.issuer.as_deref() {
            if normalize_issuer(advertised) != issuer {
                warn!(
                    "Issuer {} advertises a different issuer identifier {}",
                    issuer, advertised
                );
            }
        }

        let jwks_uri = metadata
            .jwks_uri
            .ok_or_else(|| "metadata has no jwks_uri".to_string())?;
        let jwks_uri =
            Url::parse(&jwks_uri).map_err(|e| format!("invalid jwks_uri '{jwks_uri}': {e}"))?;

        info!("Discovered issuer {} with key set at {}", issuer, jwks_uri);
        Ok(DiscoveryRecord {
            issuer: issuer.to_string(),
            key_set: Arc::new(RemoteKeySet::new(jwks_uri.clone(), self.client.clone())),
            jwks_uri,
        })
    }

    async fn fetch_metadata(
        &self,
        issuer: &str,
        well_known: &str,
    ) -> Result<ProviderMetadata, String> {
        let url = format!("{issuer}{well_known}");
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("{url} returned status {}", response.status()));
        }

        response
            .json::<ProviderMetadata>()
            .await
            .map_err(|e| format!("invalid metadata at {url}: {e}"))
    }
}
