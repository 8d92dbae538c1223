//! Fetch context providing access to host APIs.
//!
//! The fetch context is passed to every strategy and bundles the HTTP
//! transport, the authenticated API client (when a session manager is
//! wired in), the platform surface, and orchestration settings.

use std::sync::Arc;
use std::time::Duration;

use grapnel_core::{PlatformConfig, StrategySettings};

use crate::api::ApiClient;
use crate::error::{FetchError, TransportError};
use crate::host::http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

// ============================================================================
// Fetch Settings
// ============================================================================

/// Orchestration settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Run search strategies concurrently.
    pub concurrent_search: bool,
    /// First backoff delay for transient-failure retries.
    pub retry_base_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrent_search: true,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl From<&StrategySettings> for FetchSettings {
    fn from(settings: &StrategySettings) -> Self {
        Self {
            concurrent_search: settings.concurrent_search,
            ..Self::default()
        }
    }
}

impl FetchSettings {
    /// Sets sequential search.
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.concurrent_search = false;
        self
    }

    /// Sets the retry base delay.
    #[must_use]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}

// ============================================================================
// Fetch Context
// ============================================================================

/// Context provided to strategies.
pub struct FetchContext {
    /// Transport for public requests.
    pub http: Arc<dyn HttpTransport>,
    /// Authenticated client, absent when no session is wired in.
    pub api: Option<Arc<ApiClient>>,
    /// Platform surface.
    pub platform: PlatformConfig,
    /// Orchestration settings.
    pub settings: FetchSettings,
}

impl FetchContext {
    /// Creates a builder for customizing the context.
    pub fn builder() -> FetchContextBuilder {
        FetchContextBuilder::new()
    }

    /// Unauthenticated GET against a platform path.
    ///
    /// Public strategies go through here. No session headers are sent and
    /// the rate limiter is not consulted.
    pub async fn public_get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<HttpResponse, FetchError> {
        let request = HttpRequest::get(self.platform.url(path))
            .query(query)
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Referer", format!("{}/", self.platform.origin()));
        Ok(self.http.send(request).await?)
    }

    /// Returns the authenticated client or a validation error.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Validation`] when no client is configured.
    pub fn api(&self) -> Result<&ApiClient, FetchError> {
        self.api
            .as_deref()
            .ok_or_else(|| FetchError::Validation("no authenticated client configured".to_string()))
    }
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("base_url", &self.platform.base_url)
            .field("authenticated", &self.api.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Fetch Context Builder
// ============================================================================

/// Builder for constructing a `FetchContext`.
#[derive(Default)]
pub struct FetchContextBuilder {
    http: Option<Arc<dyn HttpTransport>>,
    api: Option<Arc<ApiClient>>,
    platform: PlatformConfig,
    settings: FetchSettings,
}

impl FetchContextBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP transport.
    pub fn http(mut self, http: Arc<dyn HttpTransport>) -> Self {
        self.http = Some(http);
        self
    }

    /// Sets the authenticated API client.
    pub fn api(mut self, api: Arc<ApiClient>) -> Self {
        self.api = Some(api);
        self
    }

    /// Sets the platform surface.
    pub fn platform(mut self, platform: PlatformConfig) -> Self {
        self.platform = platform;
        self
    }

    /// Sets the fetch settings.
    pub fn settings(mut self, settings: FetchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the fetch context, creating a reqwest transport if none was set.
    ///
    /// # Errors
    ///
    /// Returns an error if the default transport cannot be created.
    pub fn build(self) -> Result<FetchContext, TransportError> {
        let http = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestTransport::new(&self.platform.user_agent)?),
        };

        Ok(FetchContext {
            http,
            api: self.api,
            platform: self.platform,
            settings: self.settings,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_strategy_settings() {
        let settings = StrategySettings {
            concurrent_search: false,
            ..StrategySettings::default()
        };
        assert!(!FetchSettings::from(&settings).concurrent_search);
    }

    #[test]
    fn test_context_builder_defaults() {
        let ctx = FetchContext::builder()
            .settings(FetchSettings::default().sequential())
            .build()
            .unwrap();

        assert!(!ctx.settings.concurrent_search);
        assert!(ctx.api().is_err());
        assert_eq!(ctx.platform, PlatformConfig::default());
    }
}
