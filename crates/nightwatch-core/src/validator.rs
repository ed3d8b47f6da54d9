use regex::Regex;
use std::sync::OnceLock;

use crate::types::{PlanStep, RemediationPlan};

/// Why a command was rejected, with enough detail to surface back to the
/// reasoner so it can re-plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    NotDockerCommand,
    ShellInvocation,
    PipeOrRedirection,
    Chaining,
    Substitution,
    VariableAssignment,
    Subshell,
    Destructive,
    RemoteCodeExecution,
    NoKnownContainer,
    MultipleContainers(Vec<String>),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::NotDockerCommand => write!(f, "not a container-runtime command"),
            RejectionReason::ShellInvocation => write!(f, "shell invocation"),
            RejectionReason::PipeOrRedirection => write!(f, "pipe / redirection"),
            RejectionReason::Chaining => write!(f, "chaining"),
            RejectionReason::Substitution => write!(f, "substitution"),
            RejectionReason::VariableAssignment => write!(f, "variable assignment"),
            RejectionReason::Subshell => write!(f, "subshell"),
            RejectionReason::Destructive => write!(f, "destructive"),
            RejectionReason::RemoteCodeExecution => write!(f, "remote code execution"),
            RejectionReason::NoKnownContainer => write!(f, "no known container referenced"),
            RejectionReason::MultipleContainers(names) => {
                write!(f, "multiple containers referenced: {}", names.join(", "))
            }
        }
    }
}

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*=\S+").unwrap())
}

fn destructive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)rm\s+-rf\s+/(\*|\s|$)|dd\s+if=|mkfs(\.\w+)?\b|>\s*/dev/sd[a-z]").unwrap()
    })
}

fn remote_exec_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(curl|wget).*\|\s*(bash|sh)\b").unwrap())
}

/// Returns a word-boundary regex matching `word` literally. Used both for
/// container-name matching and for ad-hoc keyword checks elsewhere in the
/// pipeline.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    let pattern = format!(r"\b{}\b", regex::escape(word));
    Regex::new(&pattern)
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

/// Validates a single command string against the fixed rule table, then
/// checks that it references exactly one of `known_containers`.
pub fn validate_command(command: &str, known_containers: &[String]) -> Result<(), RejectionReason> {
    let trimmed = command.trim();

    if !trimmed.starts_with("docker ") {
        return Err(RejectionReason::NotDockerCommand);
    }
    if remote_exec_re().is_match(trimmed) {
        return Err(RejectionReason::RemoteCodeExecution);
    }
    if trimmed.contains("sh -c") || trimmed.contains("bash -c") {
        return Err(RejectionReason::ShellInvocation);
    }
    if trimmed.contains('|') || trimmed.contains('>') || trimmed.contains('<') {
        return Err(RejectionReason::PipeOrRedirection);
    }
    if trimmed.contains("&&") || trimmed.contains("||") || trimmed.contains(';') {
        return Err(RejectionReason::Chaining);
    }
    if trimmed.contains("$(") || trimmed.contains('`') {
        return Err(RejectionReason::Substitution);
    }
    if assignment_re().is_match(trimmed) {
        return Err(RejectionReason::VariableAssignment);
    }
    if trimmed.contains('(') || trimmed.contains(')') {
        return Err(RejectionReason::Subshell);
    }
    if destructive_re().is_match(trimmed) {
        return Err(RejectionReason::Destructive);
    }

    let matches: Vec<String> = known_containers
        .iter()
        .filter(|name| contains_word(trimmed, name))
        .cloned()
        .collect();

    match matches.len() {
        0 => Err(RejectionReason::NoKnownContainer),
        1 => Ok(()),
        _ => Err(RejectionReason::MultipleContainers(matches)),
    }
}

/// Which half of a plan an offending command came from, matching the
/// orchestrator's `remediation_command_rejected` / `verification_command_rejected`
/// tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSection {
    Remediation,
    Verification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRejection {
    pub section: PlanSection,
    pub step: PlanStep,
    pub reason: RejectionReason,
}

/// Validates every step of a plan: verification steps first (so a command
/// duplicated in both lists is tagged as a verification rejection), then
/// remediation steps.
pub fn validate_plan(
    plan: &RemediationPlan,
    known_containers: &[String],
) -> Result<(), PlanRejection> {
    for step in &plan.verification {
        if let Err(reason) = validate_command(&step.action, known_containers) {
            return Err(PlanRejection {
                section: PlanSection::Verification,
                step: step.clone(),
                reason,
            });
        }
    }
    for step in &plan.steps {
        if let Err(reason) = validate_command(&step.action, known_containers) {
            return Err(PlanRejection {
                section: PlanSection::Remediation,
                step: step.clone(),
                reason,
            });
        }
    }
    Ok(())
}
