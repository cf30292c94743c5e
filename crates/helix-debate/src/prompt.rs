//! Role prompt construction.
//!
//! A pure function of `(role, request prompt, prior outputs)`. The
//! dependency graph is fixed: the Analyst sees only the request, each later
//! role additionally sees its predecessors, the Mediator sees all four.
//! Wording is configurable through [`helix_config::PromptOverrides`];
//! structure is not.

use helix_config::PromptOverrides;

use crate::role::DebateRole;
use crate::types::RoleOutput;

/// Injects extra context (tool results) into a role's prompt.
///
/// Protocol adapters implement this; the coordinator appends whatever the
/// hook returns after the role's constructed prompt.
pub trait PromptHook: Send + Sync {
    fn inject(&self, role: DebateRole) -> Option<String>;
}

const ANALYST_TEMPLATE: &str = "You are the Analyst in a multi-model debate. \
Break the request down: identify what is being asked, the constraints, and \
the key considerations.\n\nRequest:\n{request}";

const PROPOSER_TEMPLATE: &str = "You are the Proposer in a multi-model debate. \
Using the analysis, propose a concrete answer to the request.\n\nRequest:\n{request}\n\n\
Analysis:\n{analyst}";

const CRITIC_TEMPLATE: &str = "You are the Critic in a multi-model debate. \
Find the weaknesses, errors, and omissions in the proposal.\n\nRequest:\n{request}\n\n\
Analysis:\n{analyst}\n\nProposal:\n{proposer}";

const SYNTHESIS_TEMPLATE: &str = "You are the Synthesizer in a multi-model debate. \
Combine the analysis, the proposal, and the critique into a single, complete answer \
to the request.\n\nRequest:\n{request}\n\nAnalysis:\n{analyst}\n\nProposal:\n{proposer}\n\n\
Critique:\n{critic}";

const MEDIATOR_TEMPLATE: &str = "You are the Mediator in a multi-model debate. \
Review the whole debate and deliver the final, balanced answer to the request. \
Prefer the synthesis unless the critique exposes a flaw it did not address.\n\n\
Request:\n{request}\n\nAnalysis:\n{analyst}\n\nProposal:\n{proposer}\n\n\
Critique:\n{critic}\n\nSynthesis:\n{synthesis}";

fn template_for<'a>(role: DebateRole, overrides: &'a PromptOverrides) -> &'a str {
    let configured = match role {
        DebateRole::Analyst => overrides.analyst.as_deref(),
        DebateRole::Proposer => overrides.proposer.as_deref(),
        DebateRole::Critic => overrides.critic.as_deref(),
        DebateRole::Synthesis => overrides.synthesis.as_deref(),
        DebateRole::Mediator => overrides.mediator.as_deref(),
    };
    configured.unwrap_or(match role {
        DebateRole::Analyst => ANALYST_TEMPLATE,
        DebateRole::Proposer => PROPOSER_TEMPLATE,
        DebateRole::Critic => CRITIC_TEMPLATE,
        DebateRole::Synthesis => SYNTHESIS_TEMPLATE,
        DebateRole::Mediator => MEDIATOR_TEMPLATE,
    })
}

fn output_text<'a>(prior: &'a [RoleOutput], role: DebateRole) -> &'a str {
    prior
        .iter()
        .find(|output| output.role == role && output.succeeded())
        .map(|output| output.text.as_str())
        .unwrap_or("(unavailable)")
}

/// Builds the prompt for `role`.
///
/// `prior` holds the outputs produced earlier in the current round; only
/// the roles this role is allowed to see are substituted. A failed
/// predecessor renders as `(unavailable)` so downstream roles keep working.
pub fn build_role_prompt(
    role: DebateRole,
    request_prompt: &str,
    prior: &[RoleOutput],
    overrides: &PromptOverrides,
) -> String {
    let template = template_for(role, overrides);
    let mut prompt = template.replace("{request}", request_prompt);
    // Substitute only the placeholders the dependency graph allows.
    if role > DebateRole::Analyst {
        prompt = prompt.replace("{analyst}", output_text(prior, DebateRole::Analyst));
    }
    if role > DebateRole::Proposer {
        prompt = prompt.replace("{proposer}", output_text(prior, DebateRole::Proposer));
    }
    if role > DebateRole::Critic {
        prompt = prompt.replace("{critic}", output_text(prior, DebateRole::Critic));
    }
    if role > DebateRole::Synthesis {
        prompt = prompt.replace("{synthesis}", output_text(prior, DebateRole::Synthesis));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RoleStatus, RoleOutput};
    use std::time::Duration;

    fn output(role: DebateRole, text: &str) -> RoleOutput {
        RoleOutput {
            role,
            model: None,
            latency: Duration::ZERO,
            text: text.to_string(),
            tokens: None,
            status: RoleStatus::Succeeded,
            attempts: Vec::new(),
            lossy: false,
            cancelled: false,
        }
    }

    #[test]
    fn test_analyst_sees_only_request() {
        let prompt = build_role_prompt(
            DebateRole::Analyst,
            "why is the sky blue?",
            &[],
            &PromptOverrides::default(),
        );
        assert!(prompt.contains("why is the sky blue?"));
        assert!(!prompt.contains("{analyst}"));
    }

    #[test]
    fn test_mediator_sees_all_four() {
        let prior = vec![
            output(DebateRole::Analyst, "A-TEXT"),
            output(DebateRole::Proposer, "P-TEXT"),
            output(DebateRole::Critic, "C-TEXT"),
            output(DebateRole::Synthesis, "S-TEXT"),
        ];
        let prompt = build_role_prompt(
            DebateRole::Mediator,
            "the question",
            &prior,
            &PromptOverrides::default(),
        );
        for fragment in ["A-TEXT", "P-TEXT", "C-TEXT", "S-TEXT", "the question"] {
            assert!(prompt.contains(fragment), "missing {fragment}");
        }
    }

    #[test]
    fn test_failed_predecessor_renders_unavailable() {
        let prior = vec![RoleOutput::failed(DebateRole::Analyst)];
        let prompt = build_role_prompt(
            DebateRole::Proposer,
            "q",
            &prior,
            &PromptOverrides::default(),
        );
        assert!(prompt.contains("(unavailable)"));
    }

    #[test]
    fn test_override_changes_wording_not_structure() {
        let overrides = PromptOverrides {
            critic: Some("Tear apart: {proposer} (re: {request})".to_string()),
            ..PromptOverrides::default()
        };
        let prior = vec![
            output(DebateRole::Analyst, "A"),
            output(DebateRole::Proposer, "the plan"),
        ];
        let prompt = build_role_prompt(DebateRole::Critic, "q", &prior, &overrides);
        assert_eq!(prompt, "Tear apart: the plan (re: q)");
    }
}
