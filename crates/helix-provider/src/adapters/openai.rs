//! OpenAI-compatible chat completions adapter.
//!
//! Covers every remote provider speaking the `/v1/chat/completions` wire
//! format (OpenRouter, NVIDIA NIM, vLLM, Groq, and the OpenAI API itself).
//! Credentials come from the environment variable named in the provider
//! descriptor and are redacted out of every diagnostic payload.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, warn};

use helix_shared::Deadline;

use crate::adapter::{HealthStatus, ProviderAdapter, TextStream};
use crate::error::{map_http_error, redact_secrets, ProviderError};
use crate::types::{
    Capability, Completion, CompletionParams, ModelDescriptor, ProviderDescriptor, Usage,
};

pub mod api_types;
use api_types::*;

/// Adapter for OpenAI-compatible HTTP providers.
pub struct OpenAiAdapter {
    descriptor: ProviderDescriptor,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiAdapter {
    /// Builds an adapter from a provider descriptor, resolving the
    /// credential environment variable once. A missing credential does not
    /// fail construction; calls surface `Unauthorized` instead.
    pub fn from_descriptor(descriptor: &ProviderDescriptor) -> Self {
        let api_key = descriptor
            .auth_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.is_empty());
        if descriptor.auth_env.is_some() && api_key.is_none() {
            warn!(
                provider = %descriptor.id,
                env = descriptor.auth_env.as_deref().unwrap_or_default(),
                "credential environment variable not set; calls will fail unauthorized"
            );
        }
        Self {
            base_url: descriptor.endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            api_key,
            descriptor: descriptor.clone(),
        }
    }

    fn secrets(&self) -> Vec<&str> {
        self.api_key.as_deref().into_iter().collect()
    }

    fn key(&self, model: &str) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unauthorized {
                provider: self.descriptor.id.clone(),
                model: Some(model.to_string()),
                status: None,
                detail: "credential environment variable not set".to_string(),
            })
    }

    fn map_reqwest_error(&self, model: Option<&str>, error: reqwest::Error) -> ProviderError {
        let detail = redact_secrets(&error.to_string(), &self.secrets());
        if error.is_timeout() {
            ProviderError::Timeout {
                provider: self.descriptor.id.clone(),
                model: model.map(str::to_string),
            }
        } else {
            ProviderError::Network {
                provider: self.descriptor.id.clone(),
                model: model.map(str::to_string),
                detail,
            }
        }
    }

    async fn send_chat(
        &self,
        model: &str,
        prompt: &str,
        params: &CompletionParams,
        stream: bool,
        deadline: Deadline,
    ) -> Result<reqwest::Response, ProviderError> {
        let key = self.key(model)?;
        let body = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream,
        };
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(provider = %self.descriptor.id, model, stream, "sending chat completion");

        let response = tokio::time::timeout_at(
            deadline.instant(),
            self.client.post(&url).bearer_auth(key).json(&body).send(),
        )
        .await
        .map_err(|_| ProviderError::Timeout {
            provider: self.descriptor.id.clone(),
            model: Some(model.to_string()),
        })?
        .map_err(|e| self.map_reqwest_error(Some(model), e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = parse_retry_after(&response);
            let body_text = response.text().await.unwrap_or_default();
            let detail = redact_secrets(&body_text, &self.secrets());
            return Err(map_http_error(
                &self.descriptor.id,
                Some(model),
                status,
                retry_after,
                &detail,
            ));
        }
        Ok(response)
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &str {
        &self.descriptor.id
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        self.descriptor.capabilities.clone()
    }

    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        params: &CompletionParams,
        deadline: Deadline,
    ) -> Result<Completion, ProviderError> {
        let response = self.send_chat(model, prompt, params, false, deadline).await?;
        let parsed: ChatResponse =
            tokio::time::timeout_at(deadline.instant(), response.json())
                .await
                .map_err(|_| ProviderError::Timeout {
                    provider: self.descriptor.id.clone(),
                    model: Some(model.to_string()),
                })?
                .map_err(|e| self.map_reqwest_error(Some(model), e))?;

        let text = parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::Internal {
                provider: self.descriptor.id.clone(),
                model: Some(model.to_string()),
                status: None,
                detail: "response contained no choices".to_string(),
            })?;
        let usage = parsed.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        Ok(Completion { text, usage })
    }

    async fn complete_stream(
        &self,
        model: &str,
        prompt: &str,
        params: &CompletionParams,
        deadline: Deadline,
    ) -> Result<TextStream, ProviderError> {
        let response = self.send_chat(model, prompt, params, true, deadline).await?;
        let provider = self.descriptor.id.clone();
        let model = model.to_string();
        let secrets: Vec<String> = self.secrets().iter().map(|s| s.to_string()).collect();

        let stream = async_stream::try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            'read: loop {
                let chunk = tokio::time::timeout_at(deadline.instant(), bytes.next())
                    .await
                    .map_err(|_| ProviderError::Timeout {
                        provider: provider.clone(),
                        model: Some(model.clone()),
                    })?;
                let chunk = match chunk {
                    None => break 'read,
                    Some(chunk) => chunk.map_err(|e| {
                        let secret_refs: Vec<&str> =
                            secrets.iter().map(String::as_str).collect();
                        ProviderError::Network {
                            provider: provider.clone(),
                            model: Some(model.clone()),
                            detail: redact_secrets(&e.to_string(), &secret_refs),
                        }
                    })?,
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        break 'read;
                    }
                    if let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) {
                        if let Some(delta) = parsed
                            .choices
                            .first()
                            .and_then(|choice| choice.delta.content.clone())
                        {
                            if !delta.is_empty() {
                                yield delta;
                            }
                        }
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn health_check(&self, deadline: Deadline) -> Result<HealthStatus, ProviderError> {
        let url = format!("{}/v1/models", self.base_url);
        let started = Instant::now();
        let mut request = self.client.get(&url);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }
        let response = tokio::time::timeout_at(deadline.instant(), request.send())
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: self.descriptor.id.clone(),
                model: None,
            })?
            .map_err(|e| self.map_reqwest_error(None, e))?;
        Ok(HealthStatus {
            available: response.status().is_success(),
            latency: Some(started.elapsed()),
        })
    }

    async fn models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        let url = format!("{}/v1/models", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(None, e))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_text = response.text().await.unwrap_or_default();
            let detail = redact_secrets(&body_text, &self.secrets());
            return Err(map_http_error(&self.descriptor.id, None, status, None, &detail));
        }
        let parsed: ModelList = response
            .json()
            .await
            .map_err(|e| self.map_reqwest_error(None, e))?;
        Ok(parsed
            .data
            .into_iter()
            .map(|entry| {
                ModelDescriptor::skeleton(
                    &self.descriptor.id,
                    &entry.id,
                    self.descriptor.capabilities.clone(),
                )
            })
            .collect())
    }
}
