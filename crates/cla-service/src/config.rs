//! Configuration for cla-signd

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// E-signature provider
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub callbacks: CallbackConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Signed document archive
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// GitHub API access; pull request statuses are only recorded locally without it
    #[serde(default)]
    pub github: Option<GithubConfig>,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub fan_out: FanOutConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
            request_timeout_secs: default_request_timeout(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// E-signature provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Envelopes are kept in process memory (development)
    #[default]
    Recording,

    /// Provider REST API
    Docusign {
        /// REST root, e.g. `https://demo.docusign.net/restapi`
        base_url: String,

        account_id: String,

        /// Pre-issued access token
        #[serde(default)]
        access_token: Option<String>,

        /// Client-credentials grant, used when no access token is set
        #[serde(default)]
        oauth: Option<OAuthConfig>,

        #[serde(default = "default_provider_timeout")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,

    /// Refresh this many seconds before expiry
    #[serde(default = "default_token_skew")]
    pub refresh_skew_secs: u64,
}

/// Callback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Public base URL the provider posts completion events to
    pub base_url: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,
    },
}

/// Signed document archive configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArchiveConfig {
    #[default]
    Memory,

    Filesystem { root: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,
    pub token: String,
}

/// Platform directory configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// JSON fixture seeding users, companies, projects and CLA groups
    #[serde(default)]
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// Concurrent committer lookups per pull request
    #[serde(default = "default_fan_out_width")]
    pub width: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            width: default_fan_out_width(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_size() -> usize {
    2 * 1024 * 1024
}

fn default_provider_timeout() -> u64 {
    20
}

fn default_token_skew() -> u64 {
    300
}

fn default_pool_size() -> u32 {
    10
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_fan_out_width() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load configuration from defaults, an optional file and `CLA_*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // CLA_SERVER__LISTEN_ADDR, CLA_STORAGE__TYPE, ...
        builder = builder.add_source(
            config::Environment::with_prefix("CLA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(matches!(config.provider, ProviderConfig::Recording));
        assert!(matches!(config.archive, ArchiveConfig::Memory));
        assert!(config.github.is_none());
        assert_eq!(config.fan_out.width, 8);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
listen_addr = "0.0.0.0:9090"

[callbacks]
base_url = "https://cla.example.org"

[storage]
type = "postgres"
url = "postgres://localhost/cla"

[archive]
type = "filesystem"
root = "/var/lib/cla"

[fan_out]
width = 3
"#
        )
        .unwrap();

        let config = ServiceConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9090);
        assert_eq!(config.callbacks.base_url, "https://cla.example.org");
        match config.storage {
            StorageConfig::Postgres {
                url,
                max_connections,
            } => {
                assert_eq!(url, "postgres://localhost/cla");
                assert_eq!(max_connections, 10);
            }
            other => panic!("unexpected storage {other:?}"),
        }
        assert!(matches!(config.archive, ArchiveConfig::Filesystem { .. }));
        assert_eq!(config.fan_out.width, 3);
    }
}
