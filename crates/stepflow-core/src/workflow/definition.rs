//! Workflow definition parsing, validation, and filesystem operations.
//!
//! Converts between YAML files and `WorkflowDefinition`, validates structural
//! constraints before a definition is registered, and discovers definition
//! files on disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use stepflow_types::workflow::WorkflowDefinition;
use thiserror::Error;

use super::gate;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dependency or ownership graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A step depends on a step that does not exist.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// A step depends on a step declared after it (strict mode only).
    #[error("out-of-order dependency: {0}")]
    OutOfOrderDependency(String),

    /// A step depends on a parallel member (strict mode only).
    #[error("unreachable dependency: {0}")]
    UnreachableDependency(String),

    /// A parallel or condition step names a step that does not exist.
    #[error("unknown step reference: {0}")]
    UnknownStepReference(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
///
/// Out-of-order dependencies are tolerated here; the engine decides whether
/// to reject them at registration.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def, false)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - ID is non-empty and at least one step exists
/// - Step IDs are unique
/// - Each step's `config` variant matches its `type`
/// - `depends_on`, `step_ids`, `then_steps` and `else_steps` reference
///   existing steps, and parallel/condition steps never reference themselves
/// - Each step has at most one owning parallel/condition step
/// - Neither the dependency graph nor the ownership graph has a cycle
/// - Dependencies are declared before their dependents
/// - No step depends on a member of a parallel step
///
/// Returns warnings for problems that do not prevent registration. A
/// dependency that can never be met (out of order, or on a parallel member)
/// is a warning unless `strict_order` is set.
pub fn validate_definition(
    def: &WorkflowDefinition,
    strict_order: bool,
) -> Result<Vec<String>, WorkflowError> {
    if def.id.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow id must not be empty".to_string(),
        ));
    }

    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if step.id.is_empty() {
            return Err(WorkflowError::ValidationError(
                "step id must not be empty".to_string(),
            ));
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
        if step.config.step_type() != step.step_type {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' has type '{}' but a '{}' config",
                step.id,
                step.step_type,
                step.config.step_type()
            )));
        }
    }

    // Nested step references must be valid and uniquely owned
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for step in &def.steps {
        for owned in step.owned_steps() {
            if owned == step.id {
                return Err(WorkflowError::ValidationError(format!(
                    "step '{}' references itself",
                    step.id
                )));
            }
            if !seen_ids.contains(owned) {
                return Err(WorkflowError::UnknownStepReference(format!(
                    "step '{}' references unknown step '{}'",
                    step.id, owned
                )));
            }
            if let Some(previous) = owners.insert(owned, step.id.as_str()) {
                if previous != step.id {
                    return Err(WorkflowError::ValidationError(format!(
                        "step '{owned}' is referenced by both '{previous}' and '{}'",
                        step.id
                    )));
                }
            }
        }
    }

    gate::validate_dependency_graph(def)?;
    gate::validate_ownership_graph(def)?;

    let mut warnings = Vec::new();
    for (step_id, dep) in gate::out_of_order_dependencies(def) {
        let message =
            format!("step '{step_id}' depends on '{dep}', which is not declared before it");
        if strict_order {
            return Err(WorkflowError::OutOfOrderDependency(message));
        }
        warnings.push(format!("{message}; '{step_id}' will always be skipped"));
    }

    for (step_id, dep, owner) in gate::parallel_member_dependencies(def) {
        let message = format!(
            "step '{step_id}' depends on '{dep}', which only runs inside parallel step '{owner}'"
        );
        if strict_order {
            return Err(WorkflowError::UnreachableDependency(message));
        }
        warnings.push(format!("{message}; '{step_id}' will always be skipped"));
    }

    Ok(warnings)
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Save a workflow definition to a YAML file.
///
/// Creates parent directories if they don't exist.
pub fn save_workflow_file(path: &Path, def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_workflow_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Result of scanning a directory for definition files.
#[derive(Debug, Default)]
pub struct WorkflowScan {
    /// Definitions that parsed and validated, in path order.
    pub definitions: Vec<(PathBuf, WorkflowDefinition)>,
    /// YAML files that could not be loaded, with the reason.
    pub invalid: Vec<(PathBuf, WorkflowError)>,
}

/// Scan `base_dir` recursively for `.yaml` and `.yml` files, in path order.
///
/// A missing directory yields an empty scan. Files that fail to parse or
/// validate are collected in [`WorkflowScan::invalid`].
pub fn scan_workflows(base_dir: &Path) -> Result<WorkflowScan, WorkflowError> {
    let mut scan = WorkflowScan::default();
    if !base_dir.exists() {
        return Ok(scan);
    }
    scan_recursive(base_dir, &mut scan)?;
    Ok(scan)
}

/// Discover all valid workflow definitions under `base_dir`.
///
/// Files that fail to parse or validate are skipped with a warning.
pub fn discover_workflows(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, WorkflowDefinition)>, WorkflowError> {
    let scan = scan_workflows(base_dir)?;
    for (path, error) in &scan.invalid {
        tracing::warn!(?path, %error, "skipping invalid workflow file");
    }
    Ok(scan.definitions)
}

fn scan_recursive(dir: &Path, scan: &mut WorkflowScan) -> Result<(), WorkflowError> {
    let mut paths = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            scan_recursive(&path, scan)?;
            continue;
        }
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }
        match load_workflow_file(&path) {
            Ok(def) => scan.definitions.push((path, def)),
            Err(error) => scan.invalid.push((path, error)),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
