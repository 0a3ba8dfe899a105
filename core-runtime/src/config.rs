//! # Core Configuration Module
//!
//! Provides configuration management for the radio core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the settings and injected bridges for every component.
//! Validation is fail-fast: a config that would make a component misbehave is
//! rejected at build time with an actionable message.
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - Directory API requests (desktop default: reqwest)
//!
//! ## Usage
//!
//! ```no_run
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/radio.db")
//!     .directory_servers(["https://de1.api.radio-browser.info"])
//!     .request_timeout(Duration::from_secs(10))
//!     .resume_on_focus_gain(true)
//!     .build();
//! ```
//!
//! Without the `desktop-shims` feature an `HttpClient` must be injected,
//! otherwise `build()` reports [`Error::CapabilityMissing`].

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Directory servers used until the first `/json/servers` refresh.
pub const DEFAULT_DIRECTORY_SERVERS: &[&str] = &[
    "https://de1.api.radio-browser.info",
    "https://nl1.api.radio-browser.info",
    "https://at1.api.radio-browser.info",
];

pub const DEFAULT_USER_AGENT: &str = concat!("radio-core/", env!("CARGO_PKG_VERSION"));

/// Core configuration for the radio core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database holding history and favorites
    pub database_path: PathBuf,

    pub directory: DirectorySettings,

    pub playback: PlaybackSettings,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    /// HTTP client used for directory requests
    pub http_client: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("directory", &self.directory)
            .field("playback", &self.playback)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .finish()
    }
}

/// Station directory settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectorySettings {
    /// Initial server pool, replaced wholesale by a successful server refresh
    pub servers: Vec<String>,

    pub user_agent: String,

    /// Per-request timeout passed to the HTTP client
    pub request_timeout: Duration,

    /// Result limit applied when a search does not set one
    pub default_limit: u32,

    /// Ask the directory to omit stations that failed its last check
    pub hide_broken: bool,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            servers: DEFAULT_DIRECTORY_SERVERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(10),
            default_limit: 100,
            hide_broken: true,
        }
    }
}

/// Playback engine settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    /// Resume automatically when transient audio focus loss ends.
    ///
    /// Off by default: a paused radio stays paused until the user acts.
    pub resume_on_focus_gain: bool,

    /// Output volume while ducked, in `0.0..=1.0`
    pub duck_volume: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            resume_on_focus_gain: false,
            duck_volume: 0.2,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - At least one directory server is configured and each is an http(s) URL
    /// - Timeout, limit, buffer size and duck volume are in range
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.directory.servers.is_empty() {
            return Err(Error::Config(
                "At least one directory server is required".to_string(),
            ));
        }

        if let Some(bad) = self
            .directory
            .servers
            .iter()
            .find(|s| !(s.starts_with("http://") || s.starts_with("https://")))
        {
            return Err(Error::Config(format!(
                "Directory server '{}' must be an http(s) URL",
                bad
            )));
        }

        if self.directory.user_agent.trim().is_empty() {
            return Err(Error::Config("User agent cannot be empty".to_string()));
        }

        if self.directory.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.directory.default_limit == 0 {
            return Err(Error::Config(
                "Default result limit must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.playback.duck_volume) {
            return Err(Error::Config(format!(
                "Duck volume {} is outside 0.0..=1.0",
                self.playback.duck_volume
            )));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(settings: &DirectorySettings) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(&settings.user_agent, settings.request_timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_settings: &DirectorySettings) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for station directory requests. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject the platform HTTP stack (URLSession/OkHttp)."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    directory: DirectorySettings,
    playback: PlaybackSettings,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/radio.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Replaces the initial directory server list.
    pub fn directory_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directory.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.directory.user_agent = user_agent.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.directory.request_timeout = timeout;
        self
    }

    pub fn default_limit(mut self, limit: u32) -> Self {
        self.directory.default_limit = limit;
        self
    }

    pub fn hide_broken(mut self, hide: bool) -> Self {
        self.directory.hide_broken = hide;
        self
    }

    /// Sets all directory settings at once.
    pub fn directory(mut self, settings: DirectorySettings) -> Self {
        self.directory = settings;
        self
    }

    /// Enables or disables auto-resume after transient focus loss.
    ///
    /// Default: false
    pub fn resume_on_focus_gain(mut self, enabled: bool) -> Self {
        self.playback.resume_on_focus_gain = enabled;
        self
    }

    pub fn duck_volume(mut self, volume: f32) -> Self {
        self.playback.duck_volume = volume;
        self
    }

    pub fn playback(mut self, settings: PlaybackSettings) -> Self {
        self.playback = settings;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the database path is missing or a value is out of range
    /// - [`Error::CapabilityMissing`] when no `HttpClient` is available
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&self.directory)?,
        };

        let config = CoreConfig {
            database_path,
            directory: self.directory,
            playback: self.playback,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpRequest, HttpResponse};

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpResponse, BridgeError> {
            Err(BridgeError::NotAvailable("mock".to_string()))
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/tmp/radio.db")
            .http_client(Arc::new(MockHttpClient))
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .build();

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("Database path is required")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client() {
        let result = CoreConfig::builder().database_path("/tmp/radio.db").build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "HttpClient")
            }
            other => panic!("expected missing capability, got {:?}", other),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let config = CoreConfig::builder()
            .database_path("/tmp/radio.db")
            .build()
            .expect("desktop default http client");

        assert_eq!(config.directory.servers.len(), DEFAULT_DIRECTORY_SERVERS.len());
    }

    #[test]
    fn test_builder_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.directory.default_limit, 100);
        assert!(config.directory.hide_broken);
        assert!(!config.playback.resume_on_focus_gain);
        assert_eq!(config.playback.duck_volume, 0.2);
        assert_eq!(config.directory.servers.len(), 3);
    }

    #[test]
    fn test_builder_overrides() {
        let config = builder()
            .directory_servers(["https://fi1.api.radio-browser.info"])
            .request_timeout(Duration::from_secs(3))
            .default_limit(25)
            .hide_broken(false)
            .resume_on_focus_gain(true)
            .duck_volume(0.5)
            .event_buffer_size(16)
            .build()
            .unwrap();

        assert_eq!(
            config.directory.servers,
            vec!["https://fi1.api.radio-browser.info".to_string()]
        );
        assert_eq!(config.directory.request_timeout, Duration::from_secs(3));
        assert_eq!(config.directory.default_limit, 25);
        assert!(!config.directory.hide_broken);
        assert!(config.playback.resume_on_focus_gain);
        assert_eq!(config.event_buffer_size, 16);
    }

    #[test]
    fn test_validate_rejects_empty_server_list() {
        let result = builder().directory_servers(Vec::<String>::new()).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_non_http_server() {
        let result = builder().directory_servers(["ftp://mirror.example"]).build();
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("ftp://mirror.example")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let result = builder().request_timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duck_volume_out_of_range() {
        assert!(builder().duck_volume(1.5).build().is_err());
        assert!(builder().duck_volume(-0.1).build().is_err());
        assert!(builder().duck_volume(0.0).build().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let result = builder().event_buffer_size(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_config_debug_hides_client() {
        let config = builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("HttpClient { ... }"));
        assert!(debug.contains("radio.db"));
    }
}
