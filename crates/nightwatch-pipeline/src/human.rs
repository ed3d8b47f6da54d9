use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::CapabilityError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected { feedback: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationDecision {
    Continue { context: String },
    Dismiss,
}

/// The minimal terminal dialog surface human interaction is routed through.
/// Adapted from a Discord-WASM request/response round trip to a direct
/// `stdin` prompt: there is no pending/resume state here because the
/// terminal has no timeout of its own.
pub trait HitlResponder: Send + Sync {
    fn ask_feasibility_question<'a>(
        &'a self,
        question: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CapabilityError>> + Send + 'a>>;

    fn request_approval<'a>(
        &'a self,
        summary: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ApprovalDecision, CapabilityError>> + Send + 'a>>;

    fn escalate<'a>(
        &'a self,
        reason: &'a str,
        needed_context: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<EscalationDecision, CapabilityError>> + Send + 'a>>;
}

/// Reads responses from `stdin`, prompting on `stderr` so transcripts stay
/// readable when stdout is piped or logged.
pub struct TerminalHitlResponder;

impl TerminalHitlResponder {
    pub fn new() -> Self {
        Self
    }

    async fn read_line(prompt: &str) -> Result<String, CapabilityError> {
        eprint!("{prompt}");
        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| CapabilityError::Human(e.to_string()))?;
        Ok(line.trim().to_string())
    }
}

impl Default for TerminalHitlResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl HitlResponder for TerminalHitlResponder {
    fn ask_feasibility_question<'a>(
        &'a self,
        question: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CapabilityError>> + Send + 'a>> {
        Box::pin(async move {
            let answer = Self::read_line(&format!("[nightwatch] {question}\n> ")).await?;
            if answer.is_empty() || answer.eq_ignore_ascii_case("skip") {
                Ok(None)
            } else {
                Ok(Some(answer))
            }
        })
    }

    fn request_approval<'a>(
        &'a self,
        summary: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ApprovalDecision, CapabilityError>> + Send + 'a>> {
        Box::pin(async move {
            let answer = Self::read_line(&format!(
                "[nightwatch] approve this plan?\n{summary}\n(y/n) > "
            ))
            .await?;
            if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
                return Ok(ApprovalDecision::Approved);
            }
            let feedback = if answer.is_empty() {
                Self::read_line("[nightwatch] reason for rejecting? > ").await?
            } else {
                answer
            };
            Ok(ApprovalDecision::Rejected { feedback })
        })
    }

    fn escalate<'a>(
        &'a self,
        reason: &'a str,
        needed_context: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<EscalationDecision, CapabilityError>> + Send + 'a>>
    {
        Box::pin(async move {
            let answer = Self::read_line(&format!(
                "[nightwatch] escalation: {reason}\nneeded: {needed_context}\n(provide context, or 'stop'/'dismiss') > "
            ))
            .await?;
            if answer.is_empty()
                || answer.eq_ignore_ascii_case("stop")
                || answer.eq_ignore_ascii_case("dismiss")
            {
                Ok(EscalationDecision::Dismiss)
            } else {
                Ok(EscalationDecision::Continue { context: answer })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic double driven from a fixed script, mirroring the
    /// reasoner gateway's stub.
    pub struct ScriptedHitlResponder {
        feasibility_answers: Mutex<Vec<Option<String>>>,
        approval_decisions: Mutex<Vec<ApprovalDecision>>,
        escalation_decisions: Mutex<Vec<EscalationDecision>>,
    }

    impl ScriptedHitlResponder {
        pub fn new() -> Self {
            Self {
                feasibility_answers: Mutex::new(vec![]),
                approval_decisions: Mutex::new(vec![]),
                escalation_decisions: Mutex::new(vec![]),
            }
        }

        pub fn with_approval(self, decision: ApprovalDecision) -> Self {
            self.approval_decisions.lock().unwrap().push(decision);
            self
        }
    }

    impl HitlResponder for ScriptedHitlResponder {
        fn ask_feasibility_question<'a>(
            &'a self,
            _question: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CapabilityError>> + Send + 'a>>
        {
            let answer = self.feasibility_answers.lock().unwrap().pop().flatten();
            Box::pin(async move { Ok(answer) })
        }

        fn request_approval<'a>(
            &'a self,
            _summary: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<ApprovalDecision, CapabilityError>> + Send + 'a>>
        {
            let decision = self
                .approval_decisions
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(ApprovalDecision::Approved);
            Box::pin(async move { Ok(decision) })
        }

        fn escalate<'a>(
            &'a self,
            _reason: &'a str,
            _needed_context: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<EscalationDecision, CapabilityError>> + Send + 'a>>
        {
            let decision = self
                .escalation_decisions
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(EscalationDecision::Dismiss);
            Box::pin(async move { Ok(decision) })
        }
    }

    #[tokio::test]
    async fn scripted_approval_returns_queued_decision() {
        let responder = ScriptedHitlResponder::new()
            .with_approval(ApprovalDecision::Rejected { feedback: "no".into() });
        let decision = responder.request_approval("plan summary").await.unwrap();
        assert_eq!(decision, ApprovalDecision::Rejected { feedback: "no".into() });
    }
}
