//! Verification sweep behavior against a mock OpenAI-compatible server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helix_config::{HelixConfig, VerificationConfig};
use helix_shared::Deadline;
use helix_provider::{ProviderRegistry, Verifier};

fn chat_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": "ok"}}],
        "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
    }))
}

fn config_for(server: &MockServer, models: &[&str]) -> HelixConfig {
    let toml = format!(
        r#"
        [[providers]]
        id = "nvidia"
        kind = "api-key"
        endpoint = "{}"
        auth_env = "HELIX_TEST_NVIDIA_KEY"
        tier = 2
        models = [{}]
        "#,
        server.uri(),
        models
            .iter()
            .map(|m| format!("{m:?}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    helix_config::load_from_str(&toml, helix_config::ConfigFormat::Toml).unwrap()
}

#[tokio::test]
async fn test_each_model_is_probed_independently() {
    std::env::set_var("HELIX_TEST_NVIDIA_KEY", "test-key");
    let server = MockServer::start().await;

    // One model answers, its sibling does not exist.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "meta/llama-3.1-405b-instruct"})))
        .respond_with(chat_ok())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "llama-3.1-nemotron-70b-instruct"})))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"message": "model not found"}
        })))
        .mount(&server)
        .await;

    // The configured id carries a redundant provider prefix; the registry
    // strips it exactly once.
    let config = config_for(
        &server,
        &[
            "meta/llama-3.1-405b-instruct",
            "nvidia/llama-3.1-nemotron-70b-instruct",
        ],
    );
    let registry = Arc::new(ProviderRegistry::from_config(&config).unwrap());
    let verifier = Verifier::new(registry.clone(), VerificationConfig::default(), 4);

    let summary = verifier
        .verify_all(Deadline::after(Duration::from_secs(20)))
        .await
        .unwrap();
    assert_eq!(summary.probed, 2);
    assert_eq!(summary.verified, 1);
    assert_eq!(summary.not_found, 1);

    let snapshot = registry.snapshot();
    let good = snapshot.model("nvidia", "meta/llama-3.1-405b-instruct").unwrap();
    assert!(good.verified);
    assert!(good.score > 0.0);
    assert!(good.last_verified_at.is_some());

    // The 404 outcome marks only the model that was probed, never the
    // sibling, and the sibling's success never verifies the missing model.
    let missing = snapshot
        .model("nvidia", "llama-3.1-nemotron-70b-instruct")
        .unwrap();
    assert!(!missing.verified);
    assert_eq!(missing.score, 0.0);
}

#[tokio::test]
async fn test_rate_limit_retains_previous_verification_as_stale() {
    std::env::set_var("HELIX_TEST_NVIDIA_KEY", "test-key");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(chat_ok())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .mount(&server)
        .await;

    let config = config_for(&server, &["meta/llama-3.1-405b-instruct"]);
    let registry = Arc::new(ProviderRegistry::from_config(&config).unwrap());
    let verifier = Verifier::new(registry.clone(), VerificationConfig::default(), 4);

    // First sweep verifies the model.
    verifier
        .verify_all(Deadline::after(Duration::from_secs(20)))
        .await
        .unwrap();
    assert!(
        registry
            .snapshot()
            .model("nvidia", "meta/llama-3.1-405b-instruct")
            .unwrap()
            .verified
    );

    // Second sweep hits the rate limit: verification survives, stale set.
    let summary = verifier
        .verify_all(Deadline::after(Duration::from_secs(20)))
        .await
        .unwrap();
    assert_eq!(summary.transient, 1);
    let model = registry
        .snapshot()
        .model("nvidia", "meta/llama-3.1-405b-instruct")
        .unwrap()
        .clone();
    assert!(model.verified);
    assert!(model.stale);
}

#[tokio::test]
async fn test_auth_failure_unverifies() {
    std::env::set_var("HELIX_TEST_NVIDIA_KEY", "test-key");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let config = config_for(&server, &["meta/llama-3.1-405b-instruct"]);
    let registry = Arc::new(ProviderRegistry::from_config(&config).unwrap());
    let verifier = Verifier::new(registry.clone(), VerificationConfig::default(), 4);

    let summary = verifier
        .verify_all(Deadline::after(Duration::from_secs(20)))
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert!(
        !registry
            .snapshot()
            .model("nvidia", "meta/llama-3.1-405b-instruct")
            .unwrap()
            .verified
    );
}
