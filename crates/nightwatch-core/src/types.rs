use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A single node in an incident graph: one infrastructure failure observed
/// in a specific container.
///
/// `kind` follows `<category>.<service>.<failure>`, lowercase, dot-separated,
/// and never embeds a runtime-specific container name (e.g.
/// `container.cache.stopped`, not `container.redis-prod-3.stopped`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentNode {
    pub container: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub evidence: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A causal edge: `from` (cause) precedes `to` (effect), both node indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentEdge {
    pub from: usize,
    pub to: usize,
}

/// A DAG of infrastructure failure nodes with causal edges.
///
/// Constructed only through [`IncidentGraph::new`], which enforces every
/// invariant in the data model: in-range, distinct-endpoint edges; no
/// self-loops; acyclicity; a root (if present) has no incoming edges; an
/// empty node set implies no root and no edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentGraph {
    pub nodes: Vec<IncidentNode>,
    pub edges: Vec<IncidentEdge>,
    pub root: Option<usize>,
    pub summary: String,
}

impl IncidentGraph {
    pub fn new(
        nodes: Vec<IncidentNode>,
        edges: Vec<IncidentEdge>,
        root: Option<usize>,
        summary: String,
    ) -> Result<Self, CoreError> {
        let graph = Self {
            nodes,
            edges,
            root,
            summary,
        };
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<(), CoreError> {
        let n = self.nodes.len();

        if n == 0 {
            if self.root.is_some() {
                return Err(CoreError::InvalidGraph(
                    "empty node set must have no root".into(),
                ));
            }
            if !self.edges.is_empty() {
                return Err(CoreError::InvalidGraph(
                    "empty node set must have no edges".into(),
                ));
            }
            return Ok(());
        }

        for edge in &self.edges {
            if edge.from >= n || edge.to >= n {
                return Err(CoreError::InvalidGraph(format!(
                    "edge {}->{} out of range for {} nodes",
                    edge.from, edge.to, n
                )));
            }
            if edge.from == edge.to {
                return Err(CoreError::InvalidGraph(format!(
                    "self-loop at node {}",
                    edge.from
                )));
            }
        }

        if let Some(root) = self.root {
            if root >= n {
                return Err(CoreError::InvalidGraph(format!(
                    "root index {root} out of range for {n} nodes"
                )));
            }
            if self.edges.iter().any(|e| e.to == root) {
                return Err(CoreError::InvalidGraph(
                    "root must have no incoming edges".into(),
                ));
            }
        }

        if let Some(cycle_node) = self.find_cycle() {
            return Err(CoreError::InvalidGraph(format!(
                "cycle detected through node {cycle_node}"
            )));
        }

        Ok(())
    }

    /// Returns the first node found to be part of a cycle, if any, via
    /// iterative DFS with a recursion-stack marker.
    fn find_cycle(&self) -> Option<usize> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InStack,
            Done,
        }

        let n = self.nodes.len();
        let mut mark = vec![Mark::Unvisited; n];
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in &self.edges {
            adjacency[edge.from].push(edge.to);
        }

        for start in 0..n {
            if mark[start] != Mark::Unvisited {
                continue;
            }
            // (node, next child index to visit)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            mark[start] = Mark::InStack;

            while let Some(&mut (node, ref mut next)) = stack.last_mut() {
                if *next < adjacency[node].len() {
                    let child = adjacency[node][*next];
                    *next += 1;
                    match mark[child] {
                        Mark::InStack => return Some(child),
                        Mark::Unvisited => {
                            mark[child] = Mark::InStack;
                            stack.push((child, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    mark[node] = Mark::Done;
                    stack.pop();
                }
            }
        }

        None
    }
}

/// Whether a deterministic, safely-verifiable remediation can be produced
/// given the available facts. `feasible` and `blocking_reason` are
/// mutually exclusive: `feasible ⇔ blocking_reason absent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityAssessment {
    pub feasible: bool,
    pub summary: String,
    pub blocking_reason: Option<String>,
}

impl FeasibilityAssessment {
    pub fn feasible(summary: impl Into<String>) -> Self {
        Self {
            feasible: true,
            summary: summary.into(),
            blocking_reason: None,
        }
    }

    pub fn infeasible(summary: impl Into<String>, blocking_reason: impl Into<String>) -> Self {
        Self {
            feasible: false,
            summary: summary.into(),
            blocking_reason: Some(blocking_reason.into()),
        }
    }
}

/// A single command in a plan, plus the rationale for producing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: String,
    pub reason: String,
}

/// Two ordered command sequences: `steps` restores the broken state,
/// `verification` inspects it and proves recovery. Either or both may be
/// empty; empty `steps` signals "no safe remediation exists".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RemediationPlan {
    pub summary: String,
    pub steps: Vec<PlanStep>,
    pub verification: Vec<PlanStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
}

/// The outcome of running a single [`PlanStep`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: PlanStep,
    pub status: StepStatus,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timestamp: DateTime<Utc>,
}

impl StepResult {
    pub fn success(step: PlanStep, exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            step,
            status: StepStatus::Success,
            exit_code,
            stdout,
            stderr,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(step: PlanStep, exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            step,
            status: StepStatus::Failure,
            exit_code,
            stdout,
            stderr,
            timestamp: Utc::now(),
        }
    }
}

/// The trace of running an ordered list of commands: `failed_at_step = -1`
/// iff every result succeeded; otherwise it is the index of the first
/// failure and `results.len() == failed_at_step + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub results: Vec<StepResult>,
    pub failed_at_step: i64,
}

impl ExecutionResult {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            failed_at_step: -1,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failed_at_step == -1
    }
}

/// The cross-capability back-channel: what went wrong last, so the next
/// capability invoked (almost always `planRemediation`) can react to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureContext {
    RemediationCommandRejected {
        step: String,
        reason: String,
    },
    VerificationCommandRejected {
        step: String,
        reason: String,
    },
    ExecutionFailed {
        step: String,
        reason: String,
        output: String,
    },
    VerificationFailed {
        step: String,
        reason: String,
        output: String,
    },
    UserRejected {
        reason: String,
    },
}

/// How an incident's resolution loop ended (or hasn't yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Pending,
    Resolved,
    Observed,
    Dismissed,
}

/// The single value threaded through every capability invocation for one
/// incident. Treated as immutable: every capability handler returns a new
/// value built from `with_*` methods rather than mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentResolutionState {
    pub logs: Vec<String>,
    pub incident_graph: Option<IncidentGraph>,
    pub feasibility: Option<FeasibilityAssessment>,
    pub plan: Option<RemediationPlan>,
    pub execution_result: Option<ExecutionResult>,
    pub verification_result: Option<ExecutionResult>,
    pub failure_context: Option<FailureContext>,
    /// The planner's private conversation history, opaque to every other
    /// capability. Carried across re-planning attempts so the reasoner can
    /// learn from past rejections without reinstructing.
    pub planner_history: Vec<serde_json::Value>,
    pub plan_validated: bool,
    pub resolution: Resolution,
}

impl IncidentResolutionState {
    pub fn new(logs: Vec<String>) -> Self {
        Self {
            logs,
            incident_graph: None,
            feasibility: None,
            plan: None,
            execution_result: None,
            verification_result: None,
            failure_context: None,
            planner_history: Vec::new(),
            plan_validated: false,
            resolution: Resolution::Pending,
        }
    }

    pub fn with_incident_graph(mut self, graph: Option<IncidentGraph>) -> Self {
        self.incident_graph = graph;
        self
    }

    pub fn with_feasibility(mut self, feasibility: Option<FeasibilityAssessment>) -> Self {
        self.feasibility = feasibility;
        self
    }

    /// Replace the plan. Per spec §4.3.3, planning always clears the
    /// downstream-dependent fields: validation, execution, verification,
    /// and the failure that prompted the re-plan.
    pub fn with_plan(mut self, plan: RemediationPlan) -> Self {
        self.plan = Some(plan);
        self.plan_validated = false;
        self.execution_result = None;
        self.verification_result = None;
        self.failure_context = None;
        self
    }

    pub fn with_plan_validated(mut self, validated: bool) -> Self {
        self.plan_validated = validated;
        self
    }

    pub fn with_execution_result(mut self, result: ExecutionResult) -> Self {
        self.execution_result = Some(result);
        self
    }

    pub fn with_verification_result(mut self, result: ExecutionResult) -> Self {
        self.verification_result = Some(result);
        self
    }

    pub fn with_failure_context(mut self, context: Option<FailureContext>) -> Self {
        self.failure_context = context;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// The human rejected a validated plan. Per spec §4.3.5: the plan
    /// itself is untouched (the next planning call will revise it), but
    /// validation and any downstream results are cleared and the
    /// feedback becomes the `failureContext` the next `planRemediation`
    /// call reacts to.
    pub fn with_user_rejected(mut self, feedback: impl Into<String>) -> Self {
        self.plan_validated = false;
        self.execution_result = None;
        self.verification_result = None;
        self.failure_context = Some(FailureContext::UserRejected {
            reason: feedback.into(),
        });
        self
    }

    pub fn is_pending(&self) -> bool {
        self.resolution == Resolution::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(container: &str, kind: &str) -> IncidentNode {
        IncidentNode {
            container: container.into(),
            kind: kind.into(),
            evidence: vec!["line 1".into()],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_graph_is_valid() {
        let g = IncidentGraph::new(vec![], vec![], None, "no incident".into()).unwrap();
        assert!(g.nodes.is_empty());
        assert!(g.root.is_none());
    }

    #[test]
    fn empty_graph_rejects_root() {
        let err = IncidentGraph::new(vec![], vec![], Some(0), "bad".into()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidGraph(_)));
    }

    #[test]
    fn single_node_graph_is_valid() {
        let g = IncidentGraph::new(
            vec![node("cache", "container.cache.stopped")],
            vec![],
            Some(0),
            "cache stopped".into(),
        )
        .unwrap();
        assert_eq!(g.root, Some(0));
    }

    #[test]
    fn rejects_self_loop() {
        let nodes = vec![node("cache", "container.cache.stopped")];
        let edges = vec![IncidentEdge { from: 0, to: 0 }];
        let err = IncidentGraph::new(nodes, edges, None, "bad".into()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidGraph(_)));
    }

    #[test]
    fn rejects_out_of_range_edge() {
        let nodes = vec![node("cache", "container.cache.stopped")];
        let edges = vec![IncidentEdge { from: 0, to: 5 }];
        let err = IncidentGraph::new(nodes, edges, None, "bad".into()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidGraph(_)));
    }

    #[test]
    fn rejects_root_with_incoming_edge() {
        let nodes = vec![
            node("cache", "container.cache.stopped"),
            node("api", "dependency.api.unreachable"),
        ];
        let edges = vec![IncidentEdge { from: 1, to: 0 }];
        let err = IncidentGraph::new(nodes, edges, Some(0), "bad".into()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidGraph(_)));
    }

    #[test]
    fn rejects_cycle() {
        let nodes = vec![
            node("cache", "container.cache.stopped"),
            node("api", "dependency.api.unreachable"),
            node("frontend", "dependency.frontend.degraded"),
        ];
        let edges = vec![
            IncidentEdge { from: 0, to: 1 },
            IncidentEdge { from: 1, to: 2 },
            IncidentEdge { from: 2, to: 0 },
        ];
        let err = IncidentGraph::new(nodes, edges, None, "bad".into()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidGraph(_)));
    }

    #[test]
    fn accepts_cascading_oom_graph() {
        let nodes = vec![
            node("cache", "resource.cache.oom_killed"),
            node("api", "dependency.api.connection_refused"),
            node("frontend", "dependency.frontend.upstream_error"),
        ];
        let edges = vec![IncidentEdge { from: 0, to: 1 }, IncidentEdge { from: 1, to: 2 }];
        let g = IncidentGraph::new(nodes, edges, Some(0), "cascading OOM".into()).unwrap();
        assert_eq!(g.root, Some(0));
        assert_eq!(g.edges.len(), 2);
    }

    #[test]
    fn feasibility_invariant_helpers() {
        let f = FeasibilityAssessment::feasible("restart is safe");
        assert!(f.feasible && f.blocking_reason.is_none());

        let f = FeasibilityAssessment::infeasible("unknown limit", "memory limit not known");
        assert!(!f.feasible && f.blocking_reason.is_some());
    }

    #[test]
    fn execution_result_empty_has_no_failure() {
        let e = ExecutionResult::empty();
        assert!(e.succeeded());
        assert!(e.results.is_empty());
    }

    #[test]
    fn with_plan_clears_downstream_state() {
        let state = IncidentResolutionState::new(vec!["[cache] stopped".into()])
            .with_plan(RemediationPlan {
                summary: "restart cache".into(),
                steps: vec![PlanStep {
                    action: "docker start cache".into(),
                    reason: "container stopped".into(),
                }],
                verification: vec![],
            })
            .with_plan_validated(true)
            .with_execution_result(ExecutionResult::empty())
            .with_failure_context(Some(FailureContext::ExecutionFailed {
                step: "docker start cache".into(),
                reason: "oops".into(),
                output: "".into(),
            }));

        let replanned = state.with_plan(RemediationPlan {
            summary: "try again".into(),
            steps: vec![],
            verification: vec![],
        });

        assert!(!replanned.plan_validated);
        assert!(replanned.execution_result.is_none());
        assert!(replanned.verification_result.is_none());
        assert!(replanned.failure_context.is_none());
    }
}
