//! Local subprocess adapter.
//!
//! Runs a local CLI (a `claude`-style binary, llamafile, or any executable
//! accepting `--model`/`--prompt`) once per completion and captures its
//! output. Failures carry the exit code plus both captured streams so an
//! empty stderr never hides the actual diagnostic.

use std::collections::BTreeSet;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use helix_shared::Deadline;

use crate::adapter::{HealthStatus, ProviderAdapter};
use crate::error::ProviderError;
use crate::types::{Capability, Completion, CompletionParams, ModelDescriptor, ProviderDescriptor};

/// Adapter for local executables.
///
/// Does not natively stream; the default `complete_stream` emits the full
/// response as one fragment.
pub struct SubprocessAdapter {
    descriptor: ProviderDescriptor,
}

impl SubprocessAdapter {
    pub fn from_descriptor(descriptor: &ProviderDescriptor) -> Self {
        Self {
            descriptor: descriptor.clone(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for SubprocessAdapter {
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
        let mut command = Command::new(&self.descriptor.endpoint);
        command
            .arg("--model")
            .arg(model)
            .arg("--prompt")
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(max_tokens) = params.max_tokens {
            command.arg("--max-tokens").arg(max_tokens.to_string());
        }
        debug!(provider = %self.descriptor.id, model, "spawning local completion");

        let child = command.spawn().map_err(|e| ProviderError::Internal {
            provider: self.descriptor.id.clone(),
            model: Some(model.to_string()),
            status: None,
            detail: format!("failed to spawn '{}': {}", self.descriptor.endpoint, e),
        })?;

        let output = tokio::time::timeout_at(deadline.instant(), child.wait_with_output())
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: self.descriptor.id.clone(),
                model: Some(model.to_string()),
            })?
            .map_err(|e| ProviderError::Internal {
                provider: self.descriptor.id.clone(),
                model: Some(model.to_string()),
                status: None,
                detail: format!("failed to collect process output: {}", e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "killed by signal".to_string());
            return Err(ProviderError::Internal {
                provider: self.descriptor.id.clone(),
                model: Some(model.to_string()),
                status: None,
                detail: format!(
                    "exit code {}; stdout: {:?}; stderr: {:?}",
                    code, stdout, stderr
                ),
            });
        }

        Ok(Completion {
            text: stdout,
            usage: None,
        })
    }

    async fn health_check(&self, _deadline: Deadline) -> Result<HealthStatus, ProviderError> {
        let started = Instant::now();
        let available = tokio::fs::metadata(&self.descriptor.endpoint)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        Ok(HealthStatus {
            available,
            latency: Some(started.elapsed()),
        })
    }

    async fn models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        // Local executables cannot enumerate models; the registry supplies
        // the configured list.
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn descriptor(endpoint: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            id: "local-cli".to_string(),
            kind: crate::types::ProviderKind::Local,
            endpoint: endpoint.to_string(),
            auth_env: None,
            tier: 3,
            capabilities: [Capability::Chat].into_iter().collect(),
            free: true,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_exit_code_and_both_streams() {
        // /bin/sh rejects the fixed flags and exits nonzero; the assertion
        // is about the error shape, not the shell's message.
        let adapter = SubprocessAdapter::from_descriptor(&descriptor("/bin/sh"));
        let err = adapter
            .complete(
                "m",
                "p",
                &CompletionParams::default(),
                Deadline::after(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        match err {
            ProviderError::Internal { detail, .. } => {
                assert!(detail.contains("exit code"));
                assert!(detail.contains("stdout"));
                assert!(detail.contains("stderr"));
            }
            other => panic!("expected Internal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_executable_is_internal() {
        let adapter = SubprocessAdapter::from_descriptor(&descriptor("/nonexistent/llm"));
        let err = adapter
            .complete(
                "m",
                "p",
                &CompletionParams::default(),
                Deadline::after(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_health_check_reports_missing_binary() {
        let adapter = SubprocessAdapter::from_descriptor(&descriptor("/nonexistent/llm"));
        let health = adapter
            .health_check(Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(!health.available);
    }
}
