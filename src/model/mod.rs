use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{GeneratorKind, RemoteModelSettings, Settings};

/// Something that can answer a user's chat message.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Stand-in backend that repeats the prompt.
pub struct EchoGenerator;

#[async_trait]
impl ReplyGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(format!("AI: {}", prompt))
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// A client for an OpenAI-compatible chat completions server
pub struct RemoteGenerator {
    settings: RemoteModelSettings,
    client: Client,
}

impl RemoteGenerator {
    pub fn new(settings: RemoteModelSettings) -> Result<Self> {
        info!("Using model server at: {}", settings.server_url);

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self { settings, client })
    }
}

// Some servers apply their own caps regardless of what we send
fn clamp_max_tokens(max_tokens: usize) -> usize {
    max_tokens.clamp(100, 4096)
}

fn extract_content(response: &Value) -> Result<String> {
    response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Failed to extract content from response"))
}

#[async_trait]
impl ReplyGenerator for RemoteGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let max_tokens = clamp_max_tokens(self.settings.max_tokens);
        debug!("Prompt: {}", prompt);

        let url = format!(
            "{}/v1/chat/completions",
            self.settings.server_url.trim_end_matches('/')
        );

        let messages = [
            WireMessage {
                role: "system",
                content: "You are a helpful AI assistant. Answer the user's question clearly and concisely.",
            },
            WireMessage {
                role: "user",
                content: prompt,
            },
        ];

        let payload = json!({
            "model": "local-model",
            "messages": messages,
            "temperature": self.settings.temperature,
            "top_p": self.settings.top_p,
            "max_tokens": max_tokens
        });

        debug!("Payload: {}", payload);

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow::anyhow!("API request failed ({}): {}", status, error_text));
        }

        let response_json: Value = response.json().await?;
        let content = extract_content(&response_json)?;

        info!("Response length: {} characters", content.len());
        Ok(content)
    }
}

/// Pick the generator named in `settings`.
pub fn build_generator(settings: &Settings) -> Result<Arc<dyn ReplyGenerator>> {
    match settings.generator {
        GeneratorKind::Echo => {
            info!("Using echo reply generator");
            Ok(Arc::new(EchoGenerator))
        }
        GeneratorKind::Remote => Ok(Arc::new(RemoteGenerator::new(
            settings.remote_model.clone(),
        )?)),
    }
}
