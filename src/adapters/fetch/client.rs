//! Artifact fetcher
//!
//! Retrieves the raw payload of a source over HTTP(S) or from the local
//! filesystem, applying the source's request spacing and the configured
//! retry policy, and runs the result through the artifact cache.

use super::cache::ArtifactCache;
use super::rate_limit::RateLimiter;
use super::retry::RetryPolicy;
use crate::config::schema::FetchConfig;
use crate::core::verification::content_hash;
use crate::domain::errors::FetchError;
use crate::domain::source::{
    ArtifactMeta, CacheStatus, FetchArtifact, Source, TransportStatus,
};
use crate::domain::{GridError, Result};
use chrono::Utc;
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Where a source's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Http(Url),
    File(PathBuf),
}

impl Location {
    fn parse(raw: &str) -> std::result::Result<Self, FetchError> {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Url::parse(raw)
                .map(Location::Http)
                .map_err(|e| FetchError::InvalidLocation(format!("{raw}: {e}")));
        }
        if raw.starts_with("file://") {
            let url =
                Url::parse(raw).map_err(|e| FetchError::InvalidLocation(format!("{raw}: {e}")))?;
            return url
                .to_file_path()
                .map(Location::File)
                .map_err(|_| FetchError::InvalidLocation(raw.to_string()));
        }
        if raw.contains("://") {
            return Err(FetchError::InvalidLocation(format!(
                "{raw}: unsupported scheme"
            )));
        }
        Ok(Location::File(PathBuf::from(raw)))
    }
}

/// Fetches source artifacts
pub struct Fetcher {
    http: Client,
    retry: RetryPolicy,
    limiter: RateLimiter,
    cache: ArtifactCache,
}

impl Fetcher {
    /// Build a fetcher from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let http = ClientBuilder::new()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds.min(30)))
            .build()
            .map_err(|e| GridError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            retry: RetryPolicy::from_config(&config.retry),
            limiter: RateLimiter::new(),
            cache: ArtifactCache::new(&config.cache_dir),
        })
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Fetch the artifact of `source`
    ///
    /// The returned artifact is [`CacheStatus::Unchanged`] when identical
    /// bytes were fetched before; its metadata is then the metadata of the
    /// first fetch of those bytes.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::FetchFailed`] once retries are exhausted or on a
    /// permanent failure.
    pub async fn fetch(&self, source: &Source) -> Result<FetchArtifact> {
        let fetched_at = Utc::now();
        let location = Location::parse(&source.descriptor.location)
            .map_err(|e| GridError::fetch_failed(source.key.as_str(), e))?;

        let (bytes, transport) = match location {
            Location::Http(url) => {
                let url = with_api_key(url, source);
                self.retry
                    .run(&source.key, |attempt| {
                        let url = url.clone();
                        async move {
                            self.limiter
                                .acquire(&source.key, source.min_request_interval)
                                .await;
                            tracing::debug!(source = %source.key, attempt = attempt, "Requesting artifact");
                            self.get(url).await
                        }
                    })
                    .await
            }
            Location::File(path) => read_local(&path).await.map(|b| (b, TransportStatus::File)),
        }
        .map_err(|e| GridError::fetch_failed(source.key.as_str(), e))?;

        let hash = content_hash(&bytes);

        let cached = self
            .cache
            .lookup(&source.key, &hash)
            .await
            .map_err(|e| cache_failure(source, e))?;
        if let Some((meta, path)) = cached {
            tracing::info!(source = %source.key, hash = %hash, "Artifact unchanged since earlier fetch");
            return Ok(FetchArtifact {
                meta,
                cache_status: CacheStatus::Unchanged,
                cache_path: Some(path),
                bytes,
            });
        }

        let meta = ArtifactMeta {
            source_key: source.key.clone(),
            fetched_at,
            content_hash: hash,
            transport,
            size_bytes: bytes.len() as u64,
            location: source.descriptor.location.clone(),
        };
        let path = self
            .cache
            .store(&meta, &bytes)
            .await
            .map_err(|e| cache_failure(source, e))?;

        tracing::info!(
            source = %source.key,
            bytes = meta.size_bytes,
            hash = %meta.content_hash,
            "Fetched new artifact"
        );
        Ok(FetchArtifact {
            meta,
            cache_status: CacheStatus::Fresh,
            cache_path: Some(path),
            bytes,
        })
    }

    async fn get(&self, url: Url) -> std::result::Result<(Vec<u8>, TransportStatus), FetchError> {
        let response = self.http.get(url).send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect::<String>();
            return Err(classify_status(status, message));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyResponse);
        }
        Ok((
            bytes.to_vec(),
            TransportStatus::Http {
                status: status.as_u16(),
            },
        ))
    }
}

fn with_api_key(mut url: Url, source: &Source) -> Url {
    if let Some(key) = &source.api_key {
        url.query_pairs_mut()
            .append_pair(&source.api_key_param, key.expose_secret().as_str());
    }
    url
}

async fn read_local(path: &std::path::Path) -> std::result::Result<Vec<u8>, FetchError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| FetchError::LocalFile(format!("{}: {e}", path.display())))?;
    if bytes.is_empty() {
        return Err(FetchError::EmptyResponse);
    }
    Ok(bytes)
}

fn classify_status(status: StatusCode, message: String) -> FetchError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        FetchError::RateLimited(message)
    } else if status.is_server_error() {
        FetchError::ServerError {
            status: status.as_u16(),
            message,
        }
    } else {
        FetchError::ClientError {
            status: status.as_u16(),
            message,
        }
    }
}

fn map_reqwest_error(error: reqwest::Error) -> FetchError {
    // Strip the URL so api keys in query strings never reach logs
    let error = error.without_url();
    if error.is_timeout() {
        FetchError::Timeout(error.to_string())
    } else {
        FetchError::ConnectionFailed(error.to_string())
    }
}

fn cache_failure(source: &Source, error: GridError) -> GridError {
    GridError::fetch_failed(source.key.as_str(), FetchError::LocalFile(error.to_string()))
}
