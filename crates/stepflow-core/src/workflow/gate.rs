//! Dependency gating and graph checks.
//!
//! The run coordinator makes exactly one pass over `steps` in declaration
//! order. A step is eligible when every ID in its `depends_on` has already
//! executed in that pass, so a dependency declared *after* its dependent is
//! never satisfied and the dependent is skipped. This is single-pass
//! scheduling, not a topological scheduler: authors must declare steps in an
//! order consistent with their dependency graph.
//!
//! Registration uses the graph helpers here to reject cycles and to flag
//! dependencies that can never be met: those declared out of order and
//! those naming a parallel member.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use stepflow_types::workflow::{StepType, WorkflowDefinition, WorkflowStep};

use super::definition::WorkflowError;

// ---------------------------------------------------------------------------
// Runtime gate
// ---------------------------------------------------------------------------

/// Decides whether a step may run given the steps executed so far.
pub struct DependencyGate;

impl DependencyGate {
    /// A step with no dependencies is always eligible; otherwise every
    /// dependency must be present in `executed`.
    pub fn is_eligible(step: &WorkflowStep, executed: &HashSet<String>) -> bool {
        step.depends_on.iter().all(|dep| executed.contains(dep))
    }
}

// ---------------------------------------------------------------------------
// Graph validation
// ---------------------------------------------------------------------------

/// Reject cyclic `depends_on` graphs.
///
/// Every dependency must name an existing step.
pub fn validate_dependency_graph(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    let edges = def.steps.iter().flat_map(|step| {
        step.depends_on
            .iter()
            .map(move |dep| (dep.as_str(), step.id.as_str()))
    });
    check_acyclic(def, edges, |from, to| {
        WorkflowError::UnknownDependency(format!("step '{to}' depends on unknown step '{from}'"))
    })
    .map_err(|err| match err {
        WorkflowError::CycleDetected(id) => WorkflowError::CycleDetected(format!(
            "dependency cycle involving step '{id}'"
        )),
        other => other,
    })
}

/// Reject ownership loops, where a parallel or condition step ends up
/// executing itself through its members or branches.
pub fn validate_ownership_graph(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    let edges = def.steps.iter().flat_map(|step| {
        step.owned_steps()
            .into_iter()
            .map(move |owned| (step.id.as_str(), owned))
    });
    check_acyclic(def, edges, |from, to| {
        WorkflowError::UnknownStepReference(format!("step '{from}' references unknown step '{to}'"))
    })
    .map_err(|err| match err {
        WorkflowError::CycleDetected(id) => WorkflowError::CycleDetected(format!(
            "nested step cycle involving step '{id}'"
        )),
        other => other,
    })
}

/// `(step, dependency)` pairs where the dependency is declared at or after
/// the step that needs it. Such a step is always skipped at run time.
pub fn out_of_order_dependencies(def: &WorkflowDefinition) -> Vec<(String, String)> {
    let positions: HashMap<&str, usize> = def
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut found = Vec::new();
    for (index, step) in def.steps.iter().enumerate() {
        for dep in &step.depends_on {
            if positions.get(dep.as_str()).is_some_and(|&pos| pos >= index) {
                found.push((step.id.clone(), dep.clone()));
            }
        }
    }
    found
}

/// `(step, member, parallel)` triples where a step depends on a member of a
/// parallel step. Members run against a private snapshot and never join the
/// run's executed set, so such a dependency can never be met.
pub fn parallel_member_dependencies(def: &WorkflowDefinition) -> Vec<(String, String, String)> {
    let parallel_owner: HashMap<&str, &str> = def
        .steps
        .iter()
        .filter(|step| step.step_type == StepType::Parallel)
        .flat_map(|step| {
            step.owned_steps()
                .into_iter()
                .map(move |member| (member, step.id.as_str()))
        })
        .collect();

    let mut found = Vec::new();
    for step in &def.steps {
        for dep in &step.depends_on {
            if let Some(owner) = parallel_owner.get(dep.as_str()) {
                found.push((step.id.clone(), dep.clone(), owner.to_string()));
            }
        }
    }
    found
}

/// IDs of every step owned by a parallel or condition step.
///
/// These run only through their owner and are passed over by the top-level
/// walk.
pub fn nested_step_ids(def: &WorkflowDefinition) -> HashSet<String> {
    def.steps
        .iter()
        .flat_map(WorkflowStep::owned_steps)
        .map(str::to_string)
        .collect()
}

fn check_acyclic<'a>(
    def: &'a WorkflowDefinition,
    edges: impl Iterator<Item = (&'a str, &'a str)>,
    unknown: impl Fn(&str, &str) -> WorkflowError,
) -> Result<(), WorkflowError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let nodes: HashMap<&str, _> = def
        .steps
        .iter()
        .map(|s| (s.id.as_str(), graph.add_node(s.id.as_str())))
        .collect();

    for (from, to) in edges {
        match (nodes.get(from), nodes.get(to)) {
            (Some(&a), Some(&b)) => {
                graph.add_edge(a, b, ());
            }
            _ => return Err(unknown(from, to)),
        }
    }

    toposort(&graph, None)
        .map(|_| ())
        .map_err(|cycle| WorkflowError::CycleDetected(graph[cycle.node_id()].to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
