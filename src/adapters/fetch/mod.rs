//! Artifact retrieval: HTTP and local files, retries, request spacing and
//! the content-addressed artifact cache

pub mod cache;
pub mod client;
pub mod rate_limit;
pub mod retry;

pub use cache::ArtifactCache;
pub use client::Fetcher;
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
