use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KbError, Result};
use crate::types::Role;

/// Top-level configuration for the knowledge base server.
///
/// Loaded from `~/.kbase/config.toml` by default. Every section falls back
/// to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl KbConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KbConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| KbError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Interface the API server binds to.
    pub host: String,
    /// API server port.
    pub port: u16,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "info".to_string(),
        }
    }
}

/// External vector engine connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the engine, without a trailing slash.
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Dimensionality of the configured embedding model.
    pub embedding_dim: usize,
    /// Embedding model name, logged at startup.
    pub model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            embedding_dim: 384,
            model: "multilingual-e5-small".to_string(),
        }
    }
}

/// Search behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result cap used when a request does not specify one.
    pub default_max_results: usize,
    /// Upper bound on a requested result cap.
    pub max_limit: usize,
    /// Initial over-fetch factor for category-filtered searches.
    pub overfetch_multiplier: usize,
    /// Ceiling on candidates fetched while refilling a filtered page.
    pub max_fetch: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: 10,
            max_limit: 100,
            overfetch_multiplier: 3,
            max_fetch: 200,
        }
    }
}

/// File import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
    /// Category assigned to rows without one.
    pub default_category: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            default_category: crate::types::DEFAULT_CATEGORY.to_string(),
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Origins allowed by CORS (the frontend dev server by default).
    pub allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:4200".to_string()],
        }
    }
}

/// Bearer tokens and the principals they authenticate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenEntry>,
}

impl AuthConfig {
    /// True if at least one admin token is configured.
    pub fn has_admin(&self) -> bool {
        self.tokens.iter().any(|t| t.role == Role::Admin)
    }
}

/// A single configured bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub username: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = KbConfig::default();
        assert_eq!(config.general.host, "127.0.0.1");
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.engine.url, "http://localhost:8000");
        assert_eq!(config.engine.timeout_secs, 30);
        assert_eq!(config.engine.embedding_dim, 384);
        assert_eq!(config.search.default_max_results, 10);
        assert_eq!(config.search.overfetch_multiplier, 3);
        assert_eq!(config.search.max_fetch, 200);
        assert_eq!(config.import.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.import.default_category, "General");
        assert_eq!(config.api.allowed_origins, vec!["http://localhost:4200"]);
        assert!(config.auth.tokens.is_empty());
        assert!(!config.auth.has_admin());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
port = 9090
log_level = "debug"

[engine]
url = "http://faiss:8000"
embedding_dim = 768

[search]
overfetch_multiplier = 5

[[auth.tokens]]
token = "secret-admin"
username = "admin"
role = "admin"

[[auth.tokens]]
token = "secret-user"
username = "reader"
role = "user"
"#;
        let file = create_temp_config(content);
        let config = KbConfig::load(file.path()).unwrap();
        assert_eq!(config.general.port, 9090);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.host, "127.0.0.1");
        assert_eq!(config.engine.url, "http://faiss:8000");
        assert_eq!(config.engine.embedding_dim, 768);
        assert_eq!(config.engine.timeout_secs, 30);
        assert_eq!(config.search.overfetch_multiplier, 5);
        assert_eq!(config.search.max_limit, 100);
        assert_eq!(config.auth.tokens.len(), 2);
        assert_eq!(config.auth.tokens[1].role, Role::User);
        assert!(config.auth.has_admin());
    }

    #[test]
    fn test_load_invalid_role_fails() {
        let content = r#"
[[auth.tokens]]
token = "t"
username = "u"
role = "superuser"
"#;
        let file = create_temp_config(content);
        assert!(KbConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = KbConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.port, 8080);
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = KbConfig::load(file.path());
        assert!(matches!(result, Err(KbError::Config(_))));
    }

    #[test]
    fn test_config_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = KbConfig::load(file.path()).unwrap();
        assert_eq!(config.engine.embedding_dim, 384);
        assert_eq!(config.search.default_max_results, 10);
    }

    #[test]
    fn test_config_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("dir").join("config.toml");

        let mut config = KbConfig::default();
        config.auth.tokens.push(TokenEntry {
            token: "abc".into(),
            username: "admin".into(),
            role: Role::Admin,
        });
        config.save(&path).unwrap();

        assert!(path.exists());
        let reloaded = KbConfig::load(&path).unwrap();
        assert_eq!(reloaded.general.log_level, "info");
        assert_eq!(reloaded.auth.tokens, config.auth.tokens);
    }
}
