//! HTTP client for the external vector engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use kb_core::config::EngineConfig;
use kb_core::error::{KbError, Result};

use crate::engine::{
    BatchAck, EngineDocument, EngineHit, EngineStats, IndexDocument, VectorEngine,
};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<EngineHit>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
}

/// [`VectorEngine`] backed by the engine's REST API.
#[derive(Debug, Clone)]
pub struct HttpVectorEngine {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpVectorEngine {
    /// Build a client for the engine described by `config`.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KbError::Engine(format!("Failed to build HTTP client: {}", e)))?;
        Self::with_client(client, &config.url)
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| KbError::Config(format!("Invalid engine URL '{}': {}", base_url, e)))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Resolve `segments` below the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| KbError::Config(format!("Engine URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn transport(op: &str, err: reqwest::Error) -> KbError {
    KbError::Engine(format!("{} request failed: {}", op, err))
}

/// Turn a non-2xx response into an engine error carrying the body text.
async fn check(op: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(KbError::Engine(format!("{} returned {}: {}", op, status, body)))
}

#[async_trait]
impl VectorEngine for HttpVectorEngine {
    async fn add(&self, doc: &IndexDocument) -> Result<()> {
        let response = self
            .client
            .post(self.url(&["index", "add"])?)
            .json(doc)
            .send()
            .await
            .map_err(|e| transport("add", e))?;
        check("add", response).await?;
        Ok(())
    }

    async fn add_batch(&self, docs: &[IndexDocument]) -> Result<BatchAck> {
        let body = serde_json::json!({ "documents": docs });
        let response = self
            .client
            .post(self.url(&["index", "add-batch"])?)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport("add-batch", e))?;
        check("add-batch", response)
            .await?
            .json::<BatchAck>()
            .await
            .map_err(|e| transport("add-batch", e))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&["index", "document", id])?)
            .send()
            .await
            .map_err(|e| transport("remove", e))?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(id, "Engine has no such document");
            return Ok(());
        }
        check("remove", response).await?;
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<EngineHit>> {
        let body = serde_json::json!({ "query": query, "top_k": top_k });
        let response = self
            .client
            .post(self.url(&["index", "search"])?)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport("search", e))?;
        let parsed: SearchResponse = check("search", response)
            .await?
            .json()
            .await
            .map_err(|e| transport("search", e))?;
        Ok(parsed.results)
    }

    async fn documents(&self) -> Result<Vec<EngineDocument>> {
        let response = self
            .client
            .get(self.url(&["index", "documents"])?)
            .send()
            .await
            .map_err(|e| transport("documents", e))?;
        check("documents", response)
            .await?
            .json()
            .await
            .map_err(|e| transport("documents", e))
    }

    async fn stats(&self) -> Result<EngineStats> {
        let response = self
            .client
            .get(self.url(&["index", "stats"])?)
            .send()
            .await
            .map_err(|e| transport("stats", e))?;
        check("stats", response)
            .await?
            .json()
            .await
            .map_err(|e| transport("stats", e))
    }

    async fn clear(&self) -> Result<()> {
        let response = self
            .client
            .post(self.url(&["index", "clear"])?)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| transport("clear", e))?;
        check("clear", response).await?;
        Ok(())
    }

    async fn health(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&["health"])?)
            .send()
            .await
            .map_err(|e| transport("health", e))?;
        let health: HealthResponse = check("health", response)
            .await?
            .json()
            .await
            .map_err(|e| transport("health", e))?;
        Ok(health.status == "healthy")
    }
}
