//! Shared HTTP client construction for the hosted providers.

use std::time::Duration;

/// Create the HTTP client used by all hosted providers.
///
/// Config: 30s connect timeout, 60s request timeout, rustls TLS,
/// `repograph/{version}` user-agent, redirect limit 10.
///
/// # Panics
///
/// Panics if the TLS backend cannot be initialized.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("repograph/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}
