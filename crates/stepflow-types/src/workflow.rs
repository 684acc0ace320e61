//! Workflow domain types for Stepflow.
//!
//! Defines the declarative workflow shape (`WorkflowDefinition`,
//! `WorkflowStep`, `StepConfig`) and the execution tracking types produced by
//! a run (`WorkflowRun`, `StepResult`, `RunSummary`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A named, ordered list of steps plus default variables.
///
/// Step order is significant: the engine walks `steps` once, top to bottom,
/// so a step must be declared after every step it depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow ID. Re-registering the same ID replaces the definition.
    pub id: String,
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered step list.
    pub steps: Vec<WorkflowStep>,
    /// Default variables merged into every run (caller input wins on conflict).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, Value>,
}

impl WorkflowDefinition {
    /// Look up a step by ID.
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Position of a step in declaration order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Workflow Step
// ---------------------------------------------------------------------------

/// A single unit of work inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step ID, unique within its definition.
    pub id: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The kind of step. Must agree with the `config` variant.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Step-specific configuration payload.
    pub config: StepConfig,
    /// Step IDs that must have executed earlier in the same pass.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// What to do when the step fails.
    #[serde(default)]
    pub on_error: OnError,
    /// Additional attempts after the first failure (only with `on_error: retry`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl WorkflowStep {
    /// Display label: the name when set, otherwise the ID.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// IDs of the steps this step executes on its own behalf
    /// (parallel members or condition branches).
    pub fn owned_steps(&self) -> Vec<&str> {
        match &self.config {
            StepConfig::Parallel { step_ids } => step_ids.iter().map(String::as_str).collect(),
            StepConfig::Condition {
                then_steps,
                else_steps,
                ..
            } => then_steps
                .iter()
                .chain(else_steps.iter())
                .map(String::as_str)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// The kind of step in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Tool,
    Delay,
    Transform,
    Parallel,
    Condition,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepType::Tool => "tool",
            StepType::Delay => "delay",
            StepType::Transform => "transform",
            StepType::Parallel => "parallel",
            StepType::Condition => "condition",
        };
        f.write_str(s)
    }
}

/// Step-specific configuration payload.
///
/// Internally tagged by `type`:
/// ```yaml
/// config:
///   type: tool
///   tool_name: http.get
///   params:
///     url: "{{endpoint}}"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Call a tool through the injected tool registry.
    Tool {
        tool_name: String,
        #[serde(default)]
        params: HashMap<String, Value>,
    },
    /// Sleep for `ms` milliseconds (capped by the engine).
    Delay { ms: u64 },
    /// Evaluate an expression; its value becomes the step output.
    Transform { code: String },
    /// Run sibling steps concurrently and collect their results.
    Parallel { step_ids: Vec<String> },
    /// Evaluate `expression` and run one branch of sibling steps in sequence.
    Condition {
        expression: String,
        #[serde(default)]
        then_steps: Vec<String>,
        #[serde(default)]
        else_steps: Vec<String>,
    },
}

impl StepConfig {
    /// The step type this config variant belongs to.
    pub fn step_type(&self) -> StepType {
        match self {
            StepConfig::Tool { .. } => StepType::Tool,
            StepConfig::Delay { .. } => StepType::Delay,
            StepConfig::Transform { .. } => StepType::Transform,
            StepConfig::Parallel { .. } => StepType::Parallel,
            StepConfig::Condition { .. } => StepType::Condition,
        }
    }
}

/// Error policy for a failed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Fail the whole run (default).
    #[default]
    Fail,
    /// Record the failure and keep going.
    Skip,
    /// Re-execute up to `retry_count` more times.
    Retry,
}

// ---------------------------------------------------------------------------
// Execution status
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Status of a single step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

// ---------------------------------------------------------------------------
// Step Result
// ---------------------------------------------------------------------------

/// Outcome of one step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    /// Step output payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl StepResult {
    /// A completed result whose timing spans `started_at` to now.
    pub fn completed(step_id: &str, data: Option<Value>, started_at: DateTime<Utc>) -> Self {
        Self::finish(step_id, StepStatus::Completed, data, None, started_at)
    }

    /// A failed result whose timing spans `started_at` to now.
    pub fn failed(step_id: &str, error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::finish(step_id, StepStatus::Failed, None, Some(error.into()), started_at)
    }

    /// A skipped result with zero duration.
    pub fn skipped(step_id: &str, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self::finish(step_id, StepStatus::Skipped, None, Some(reason.into()), now)
    }

    fn finish(
        step_id: &str,
        status: StepStatus,
        data: Option<Value>,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now().max(started_at);
        Self {
            step_id: step_id.to_string(),
            status,
            data,
            error,
            started_at,
            completed_at,
            duration_ms: elapsed_ms(started_at, completed_at),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Compact `{step_id, status, data, error}` entry used in parallel output.
    pub fn to_parallel_entry(&self) -> ParallelEntry {
        ParallelEntry {
            step_id: self.step_id.clone(),
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }
}

/// One sub-step entry in a parallel step's output array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelEntry {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Which branch a condition step took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Then,
    Else,
}

/// Synthetic output recorded for a condition step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionOutcome {
    pub condition: bool,
    pub branch: Branch,
}

impl ConditionOutcome {
    pub fn new(condition: bool) -> Self {
        let branch = if condition { Branch::Then } else { Branch::Else };
        Self { condition, branch }
    }

    pub fn to_value(self) -> Value {
        json!({
            "condition": self.condition,
            "branch": self.branch,
        })
    }
}

// ---------------------------------------------------------------------------
// Step Results (ordered map)
// ---------------------------------------------------------------------------

/// Step results keyed by step ID, iterated in execution order.
///
/// Holds at most one entry per step ID; inserting an ID that is already
/// present replaces the entry in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepResults(Vec<StepResult>);

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: StepResult) {
        match self.0.iter_mut().find(|r| r.step_id == result.step_id) {
            Some(existing) => *existing = result,
            None => self.0.push(result),
        }
    }

    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.0.iter().find(|r| r.step_id == step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.get(step_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepResult> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of results with status `completed`.
    pub fn completed_count(&self) -> usize {
        self.0.iter().filter(|r| r.is_completed()).count()
    }

    /// The first failed result in execution order.
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.0.iter().find(|r| r.status == StepStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// Workflow Run
// ---------------------------------------------------------------------------

/// One execution instance of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// UUIDv7 run ID, assigned once at creation.
    pub id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    /// Variable bag: definition defaults, caller input, and `step_<id>` outputs.
    pub variables: HashMap<String, Value>,
    pub step_results: StepResults,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Set only when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of steps in the definition when the run started.
    #[serde(default)]
    pub steps_total: usize,
}

impl WorkflowRun {
    /// Create a running run for `definition`, seeding variables from the
    /// definition defaults overlaid with `input` (input wins on conflict).
    pub fn start(definition: &WorkflowDefinition, input: HashMap<String, Value>) -> Self {
        let mut variables = definition.variables.clone();
        variables.extend(input);

        Self {
            id: Uuid::now_v7(),
            workflow_id: definition.id.clone(),
            status: RunStatus::Running,
            variables,
            step_results: StepResults::new(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error: None,
            steps_total: definition.steps.len(),
        }
    }

    /// Variable key under which a step's output is stored.
    pub fn output_key(step_id: &str) -> String {
        format!("step_{step_id}")
    }

    /// Record a step result, exposing its data as `step_<id>` when present.
    pub fn record(&mut self, result: StepResult) {
        if let Some(data) = &result.data {
            self.variables
                .insert(Self::output_key(&result.step_id), data.clone());
        }
        self.step_results.insert(result);
    }

    /// Transition to `failed` with the given message. A terminal run is left unchanged.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Failed;
            self.error = Some(error.into());
        }
    }

    /// Finalize timing and, if still running, mark the run completed.
    pub fn finalize(&mut self) {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Completed;
        }
        let completed_at = Utc::now().max(self.started_at);
        self.completed_at = Some(completed_at);
        self.duration_ms = Some(elapsed_ms(self.started_at, completed_at));
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.id,
            workflow_id: self.workflow_id.clone(),
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration_ms,
            steps_completed: self.step_results.completed_count(),
            steps_total: self.steps_total,
            error: self.error.clone(),
        }
    }
}

/// Lightweight view of a run for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub steps_completed: usize,
    pub steps_total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
