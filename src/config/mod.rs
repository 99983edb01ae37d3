use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JWT flow mediated by the auth and content functions
    Functions,
    /// Direct REST calls against the account, databases and storage APIs
    Direct,
    /// In-process backend for offline previews
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Functions => write!(f, "functions"),
            Self::Direct => write!(f, "direct"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    /// Backend API root, e.g. https://cloud.appwrite.io/v1
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_database_id")]
    pub database_id: String,
    /// Function handling login, verify and refresh (functions backend)
    #[serde(default)]
    pub auth_function_id: String,
    /// Function handling content CRUD and uploads (functions backend)
    #[serde(default)]
    pub content_function_id: String,
    #[serde(default)]
    pub memory: MemoryBackendConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            endpoint: default_endpoint(),
            project_id: String::new(),
            database_id: default_database_id(),
            auth_function_id: String::new(),
            content_function_id: String::new(),
            memory: MemoryBackendConfig::default(),
        }
    }
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Functions
}

fn default_endpoint() -> String {
    "https://cloud.appwrite.io/v1".to_string()
}

fn default_database_id() -> String {
    "portfolio".to_string()
}

/// Seed account for the in-process backend
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryBackendConfig {
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
    /// Lifetime of issued access tokens in seconds (default: 900)
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: u64,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            admin_email: default_admin_email(),
            admin_password: default_admin_password(),
            admin_name: default_admin_name(),
            access_token_ttl_secs: default_access_token_ttl(),
        }
    }
}

fn default_admin_email() -> String {
    "admin@localhost".to_string()
}

fn default_admin_password() -> String {
    "admin".to_string()
}

fn default_admin_name() -> String {
    "Admin".to_string()
}

fn default_access_token_ttl() -> u64 {
    900
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the persisted session file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Treat access tokens expiring within this many milliseconds as expired (default: 10000)
    #[serde(default = "default_refresh_buffer_ms")]
    pub refresh_buffer_ms: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            refresh_buffer_ms: default_refresh_buffer_ms(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_refresh_buffer_ms() -> i64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_bucket_id")]
    pub bucket_id: String,
    /// Largest accepted image upload in bytes (default: 10MB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_id: default_bucket_id(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bucket_id() -> String {
    "portfolio_images".to_string()
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Problems that would stop the configured backend from working
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let backend = &self.backend;

        if backend.kind != BackendKind::Memory {
            let endpoint = backend.endpoint.as_str();
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                problems.push(format!(
                    "backend.endpoint must be an http(s) URL, got '{}'",
                    backend.endpoint
                ));
            }
            if backend.project_id.trim().is_empty() {
                problems.push("backend.project_id is required".to_string());
            }
        }

        match backend.kind {
            BackendKind::Functions => {
                for (key, value) in [
                    ("auth_function_id", &backend.auth_function_id),
                    ("content_function_id", &backend.content_function_id),
                ] {
                    if value.trim().is_empty() {
                        problems.push(format!(
                            "backend.{} is required for the functions backend",
                            key
                        ));
                    }
                }
            }
            BackendKind::Direct => {
                if backend.database_id.trim().is_empty() {
                    problems
                        .push("backend.database_id is required for the direct backend".to_string());
                }
            }
            BackendKind::Memory => {
                if backend.memory.access_token_ttl_secs == 0 {
                    problems
                        .push("backend.memory.access_token_ttl_secs must be positive".to_string());
                }
            }
        }

        if self.session.refresh_buffer_ms < 0 {
            problems.push("session.refresh_buffer_ms must not be negative".to_string());
        }
        if self.storage.max_upload_bytes == 0 {
            problems.push("storage.max_upload_bytes must be positive".to_string());
        }
        if self.storage.bucket_id.trim().is_empty() {
            problems.push("storage.bucket_id is required".to_string());
        }

        problems
    }
}
