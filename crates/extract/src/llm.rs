use async_trait::async_trait;
use ingest::{Error, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque text generation service used for extraction and answer synthesis.
///
/// Calls must be safe to repeat: the retry policy may issue the same prompt
/// more than once.
#[async_trait]
pub trait LlmCapability: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    json_output: bool,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>, // "json" for structured output
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "llama3".to_string(),
        )
    }
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            json_output: false,
            timeout: Duration::from_secs(120),
            client: reqwest::Client::new(),
        }
    }

    /// Ask the model for a JSON document instead of free text
    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmCapability for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: self.json_output.then_some("json"),
        };

        let response = self.client
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(ollama_response.response)
    }
}

fn classify_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Error::TransientProvider(format!("Failed to send request to Ollama: {}", e))
    } else {
        Error::Provider(format!("Failed to send request to Ollama: {}", e))
    }
}

/// Rate limits, timeouts and server errors are worth another attempt
pub fn classify_status(status: StatusCode, body: &str) -> Error {
    let message = format!("Ollama request failed: {} {}", status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Error::TransientProvider(message)
    } else {
        Error::Provider(message)
    }
}
