//! CLI argument definitions for the kbase server.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// kbase: a knowledge base server with semantic search over an external vector engine.
#[derive(Parser, Debug)]
#[command(name = "kbase", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Base URL of the vector engine.
    #[arg(short = 'e', long = "engine-url")]
    pub engine_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Use an in-process vector engine instead of the HTTP one.
    #[arg(long = "offline")]
    pub offline: bool,
}

impl CliArgs {
    /// Priority: --config flag > KBASE_CONFIG env var > ~/.kbase/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("KBASE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --port flag > KBASE_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("KBASE_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Priority: --engine-url flag > KBASE_ENGINE_URL env var > config file value.
    pub fn resolve_engine_url(&self, config_url: &str) -> String {
        if let Some(ref url) = self.engine_url {
            return url.clone();
        }
        if let Ok(url) = std::env::var("KBASE_ENGINE_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        config_url.to_string()
    }

    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".kbase").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".kbase").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_take_priority() {
        let args = CliArgs::parse_from([
            "kbase",
            "--config",
            "/tmp/kb.toml",
            "--port",
            "9999",
            "--engine-url",
            "http://faiss:8000",
            "--log-level",
            "debug",
            "--offline",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/kb.toml"));
        assert_eq!(args.resolve_port(8080), 9999);
        assert_eq!(
            args.resolve_engine_url("http://localhost:8000"),
            "http://faiss:8000"
        );
        assert_eq!(args.resolve_log_level("info"), "debug");
        assert!(args.offline);
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let args = CliArgs::parse_from(["kbase"]);
        assert_eq!(args.resolve_log_level("warn"), "warn");
        assert!(!args.offline);
    }
}
