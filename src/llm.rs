//! Generation collaborator
//! Ollama wrapper for RAG answers with context documents
//!
//! Failures never propagate as errors: timeouts and transport problems come
//! back as error-shaped answer strings so the pipeline completes and lineage
//! is still recorded.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::store::RetrievedDocument;

const GENERATION_TIMEOUT: Duration = Duration::from_secs(180);
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// HTTP client for the Ollama generation API
pub struct LlmClient {
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Generate an answer from the query and clean context documents
    pub async fn generate(&self, query: &str, context_docs: &[RetrievedDocument]) -> String {
        if context_docs.is_empty() {
            return "No information available to answer this query.".to_string();
        }

        let context = context_docs
            .iter()
            .enumerate()
            .map(|(i, doc)| format!("Document {}:\n{}", i + 1, doc.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "You are a security analyst assistant. Answer the following question using ONLY \
             the provided context documents. Be concise and accurate.\n\n\
             Context:\n{}\n\nQuestion: {}\n\nAnswer:",
            context, query
        );

        let request = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(GENERATION_TIMEOUT)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            }));

        match request.send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => match response.json::<GenerateResponse>().await {
                    Ok(body) => body.response.trim().to_string(),
                    Err(err) => format!("Error generating response: {}", err),
                },
                Err(err) => format!("Error generating response: {}", err),
            },
            Err(err) => format!("Error generating response: {}", err),
        }
    }

    /// True when Ollama answers and the configured model is present
    pub async fn check_status(&self) -> bool {
        let request = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(STATUS_TIMEOUT);

        match request.send().await {
            Ok(response) => match response.json::<TagsResponse>().await {
                Ok(tags) => tags.models.iter().any(|m| m.name.contains(&self.model)),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }
}
