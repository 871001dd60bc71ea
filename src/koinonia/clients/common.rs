//! Shared HTTP plumbing for API clients.
//!
//! Maintains a singleton `reqwest::Client` so that connections are reused
//! across requests (connection pooling), DNS lookups are minimized, and TLS
//! handshakes are amortized over the process lifetime.

use lazy_static::lazy_static;
use std::time::Duration;

lazy_static! {
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        // Keep idle connections alive for 90 seconds
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        // Allow up to 10 idle connections per host for better throughput
        .pool_max_idle_per_host(10)
        // Enable TCP keepalive to prevent connection drops
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .build()
        .expect("Failed to build HTTP client");
}

/// Get the shared HTTP client used by all bundled API clients.
pub fn get_shared_http_client() -> reqwest::Client {
    SHARED_HTTP_CLIENT.clone()
}
