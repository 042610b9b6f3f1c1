use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl Default for EmbeddingClient {
    fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "nomic-embed-text".to_string(),
        )
    }
}

impl EmbeddingClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    /// Embed several texts in one request; output order matches input order
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Embedding request failed: {}", response.status());
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        if embed_response.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: sent {}, got {}",
                texts.len(),
                embed_response.embeddings.len()
            );
        }

        Ok(embed_response.embeddings)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .context("Empty embedding response")
    }

    /// Probe the model for its vector size
    pub async fn dimension(&self) -> Result<usize> {
        Ok(self.embed("dimension probe").await?.len())
    }
}
