use crate::config::GeneratorSettings;
use crate::error::{MarketContextError, Result};
use crate::generator::TextGenerator;
use crate::llm::types::*;
use futures::future::BoxFuture;
use log::{debug, warn};
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    settings: GeneratorSettings,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_settings(api_key, GeneratorSettings::default())
    }

    pub fn with_settings(api_key: String, settings: GeneratorSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            settings,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Calls `generateContent`, retrying timeouts, connection failures, 429s
    /// and 5xx responses with linear backoff.
    pub async fn generate_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let attempts = self.settings.max_transport_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.generate_once(system_prompt, user_prompt).await {
                Ok(text) => return Ok(text),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retryable(msg)) => {
                    warn!(
                        "Gemini call failed (attempt {}/{}): {}",
                        attempt, attempts, msg
                    );
                    last_error = msg;
                    if attempt < attempts {
                        sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                    }
                }
            }
        }

        Err(MarketContextError::Transport(format!(
            "Gemini call failed after {} attempts: {}",
            attempts, last_error
        )))
    }

    async fn generate_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> std::result::Result<String, Attempt> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.settings.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content::user(user_prompt)],
            system_instruction: Content::system(system_prompt),
            generation_config: GenerationConfig {
                response_mime_type: "text/plain".to_string(),
                temperature: self.settings.temperature,
            },
        };

        debug!("POST generateContent model={}", self.settings.model);
        let res = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    Attempt::Retryable(e.to_string())
                } else {
                    Attempt::Fatal(e.into())
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let err_text = res.text().await.unwrap_or_default();
            let msg = format!("Gemini API Error (status {}): {}", status, err_text);
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(Attempt::Retryable(msg))
            } else {
                Err(Attempt::Fatal(MarketContextError::Transport(msg)))
            };
        }

        let body: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| Attempt::Fatal(MarketContextError::Transport(e.to_string())))?;

        body.first_text().ok_or_else(|| {
            Attempt::Fatal(MarketContextError::Transport(
                "Model returned no text candidates".to_string(),
            ))
        })
    }
}

enum Attempt {
    Retryable(String),
    Fatal(MarketContextError),
}

impl TextGenerator for GeminiClient {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.generate_text(system, user))
    }
}
