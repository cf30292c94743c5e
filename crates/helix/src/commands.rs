//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use helix_config::load_config;
use helix_debate::DebateEvent;
use helix_gateway::{
    Gateway, PolicyOverrides, RequestBody, RequestMode, SubmitOutcome, SubmitRequest,
};
use helix_provider::{ProviderRegistry, Verifier};
use helix_shared::Deadline;
use helix_store::MemoryLogStore;

/// Arguments for `helix ask`.
#[derive(Args)]
pub struct AskArgs {
    /// The prompt to debate
    pub prompt: String,

    /// Use a single provider instead of the full debate
    #[arg(long)]
    pub single: bool,

    /// Stream role events and token deltas as they happen
    #[arg(long)]
    pub stream: bool,

    /// Skip the verification sweep before asking (models must already be
    /// verified in this process)
    #[arg(long)]
    pub no_verify: bool,
}

async fn build_registry(config_path: &str) -> Result<(Arc<helix_config::HelixConfig>, Arc<ProviderRegistry>)> {
    let config = Arc::new(load_config(config_path)?);
    let registry = Arc::new(
        ProviderRegistry::from_config(&config).context("failed to build provider registry")?,
    );
    Ok((config, registry))
}

async fn run_verification(
    config: &helix_config::HelixConfig,
    registry: Arc<ProviderRegistry>,
) -> Result<()> {
    let verifier = Verifier::new(
        registry,
        config.verification.clone(),
        config.limits.max_concurrent_verifications,
    );
    let deadline = Deadline::after(Duration::from_secs(60));
    let summary = verifier.verify_all(deadline).await?;
    info!(
        probed = summary.probed,
        verified = summary.verified,
        "verification finished"
    );
    Ok(())
}

pub async fn ask(config_path: &str, args: AskArgs) -> Result<()> {
    let (config, registry) = build_registry(config_path).await?;
    if !args.no_verify {
        run_verification(&config, registry.clone()).await?;
    }

    let store = Arc::new(MemoryLogStore::new());
    let gateway = Gateway::new(config, registry).with_store(store);
    let request = SubmitRequest {
        body: RequestBody::Prompt { prompt: args.prompt },
        mode: if args.single {
            RequestMode::Single
        } else {
            RequestMode::Debate
        },
        stream: args.stream,
        policy: PolicyOverrides::default(),
    };

    match gateway.submit(request).await {
        Ok(SubmitOutcome::Completed(response)) => {
            if let Some(warning) = response.warning {
                eprintln!("warning: {warning:?}: some roles failed; answer is degraded");
            }
            println!("{}", response.final_answer);
            Ok(())
        }
        Ok(SubmitOutcome::Streaming(mut streaming)) => {
            while let Some(event) = streaming.events.next().await {
                render_event(&event);
            }
            match streaming.handle.await? {
                Ok(_) => Ok(()),
                Err(error) => Err(error.into()),
            }
        }
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(match error.code {
                helix_shared::ErrorCode::InvalidRequest => 2,
                helix_shared::ErrorCode::InsufficientProviders => 3,
                helix_shared::ErrorCode::Overloaded => 4,
                helix_shared::ErrorCode::Timeout => 5,
                _ => 1,
            });
        }
    }
}

fn render_event(event: &DebateEvent) {
    match event {
        DebateEvent::TeamAnnounced { team } => {
            for role in &team.roles {
                eprintln!("[team] {} -> {}", role.role, role.primary);
            }
        }
        DebateEvent::RoleStarted { role, model } => {
            eprintln!("[{role}] started on {model}");
        }
        DebateEvent::RoleTokenDelta { delta, .. } => {
            print!("{delta}");
        }
        DebateEvent::RoleCompleted { output } => {
            println!();
            eprintln!(
                "[{}] {:?} after {} attempt(s)",
                output.role,
                output.status,
                output.attempts.len()
            );
        }
        DebateEvent::RoleFallbackTriggered {
            role,
            failed,
            next,
            error,
        } => {
            eprintln!("[{role}] {failed} failed ({error}); trying {next}");
        }
        DebateEvent::ConsensusStarted => eprintln!("[consensus] started"),
        DebateEvent::FinalAnswer { text } => {
            println!("\n{text}");
        }
        DebateEvent::Aborted { reason } => {
            eprintln!("[aborted] {reason}");
        }
    }
}

pub async fn verify(config_path: &str) -> Result<()> {
    let (config, registry) = build_registry(config_path).await?;
    run_verification(&config, registry.clone()).await?;

    let snapshot = registry.snapshot();
    println!(
        "{:<40} {:>8} {:>9} {:>7}",
        "model", "verified", "score", "stale"
    );
    for model in snapshot.models() {
        println!(
            "{:<40} {:>8} {:>9.3} {:>7}",
            model.model_ref().to_string(),
            model.verified,
            model.score,
            model.stale
        );
    }
    Ok(())
}

pub async fn models(config_path: &str) -> Result<()> {
    let (_config, registry) = build_registry(config_path).await?;
    let snapshot = registry.snapshot();
    for (id, provider) in snapshot.providers() {
        println!(
            "{} ({:?}, tier {}, free: {})",
            id, provider.kind, provider.tier, provider.free
        );
        for model in snapshot.provider_models(id) {
            println!("  {}", model.model_ref());
        }
    }
    Ok(())
}
