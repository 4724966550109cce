use crate::middleware::auth::TokenStore;
use anyhow::{Context, Result};
use reqhub_core::access::UserRole;
use reqhub_core::services::Services;
use reqhub_core::storage::Store;
use reqhub_mcp::{McpLogger, McpServer, McpServerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Redb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "default_store_file")]
    pub file: String,
}

fn default_store_file() -> String {
    "reqhub.redb".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            file: default_store_file(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// EnvFilter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "reqhub=info,reqhub_core=info,reqhub_mcp=info,tower_http=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_server_name")]
    pub server_name: String,

    #[serde(default)]
    pub tools_list_changed: bool,

    #[serde(default)]
    pub prompts_list_changed: bool,
}

fn default_server_name() -> String {
    "reqhub".to_string()
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            tools_list_changed: false,
            prompts_list_changed: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// A pre-issued personal access token, stored by digest only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Lowercase hex SHA-256 of the raw token
    pub token_sha256: String,
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
}

impl ServerConfig {
    pub fn load(config_path: &Path, data_dir: PathBuf) -> Result<Self> {
        // Create data directory if it doesn't exist
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        // Load config file if it exists, otherwise use defaults
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self::default()
        };

        config.data_dir = data_dir;

        Ok(config)
    }

    /// Get the store file path
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.file)
    }

    fn mcp_server_config(&self) -> McpServerConfig {
        McpServerConfig {
            name: self.mcp.server_name.clone(),
            tools_list_changed: self.mcp.tools_list_changed,
            prompts_list_changed: self.mcp.prompts_list_changed,
            ..McpServerConfig::default()
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub mcp: McpServer,
    pub logger: McpLogger,
    pub tokens: TokenStore,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let store = match config.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on shutdown");
                Store::in_memory()
            }
            StorageBackend::Redb => Store::open_redb(&config.store_path())
                .context("Failed to open requirements store")?,
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: &ServerConfig, store: Store) -> Result<Self> {
        let tokens = TokenStore::from_config(&config.auth.tokens)?;
        let services = Services::new(store);
        let logger = McpLogger::default();
        let mcp = McpServer::new(config.mcp_server_config(), services.clone(), logger.clone());

        tracing::info!(tokens = tokens.len(), "Application state ready");
        Ok(Self {
            services,
            mcp,
            logger,
            tokens,
        })
    }
}
