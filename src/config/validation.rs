//! Validation of pipeline descriptions before anything is built.
//!
//! The checks run in a fixed order so that later checks can rely on the
//! structure established by earlier ones:
//!
//! 1. **Uniqueness**: stage ids are unique and every stage runs at least one copy
//! 2. **References**: edges and error-handling targets name existing stages
//! 3. **Ranges**: explicit copy indices exist and queue capacities are non-zero
//! 4. **Cycle detection**: DFS over the stage graph, error targets included
//!
//! Cycle detection is skipped when earlier checks failed, since it needs a
//! graph whose links all resolve.
//!
//! # Example
//! ```rust
//! use the_pipewood::config::{validate_description, EdgeConfig, PipelineDescription, PipelineOptions, StageConfig};
//! use the_pipewood::errors::ValidationError;
//!
//! let description = PipelineDescription {
//!     name: "example".to_string(),
//!     options: PipelineOptions::default(),
//!     stages: vec![StageConfig::new("read", "rows"), StageConfig::new("out", "dummy")],
//!     edges: vec![EdgeConfig::new("read", "missing")],
//! };
//!
//! let errors = validate_description(&description).unwrap_err();
//! assert!(matches!(errors[0], ValidationError::UnresolvedStage { .. }));
//! ```

use std::collections::{HashMap, HashSet};

use crate::config::{PipelineDescription, StageGraph};
use crate::errors::ValidationError;
use crate::observability::messages::validation::{CyclicDependencyDetected, ValidationStarted};
use crate::observability::messages::StructuredLog;

/// Validates a description for structural integrity.
///
/// Errors are accumulated so that every problem is reported at once, except
/// for cycle detection which only runs on an otherwise valid description.
pub fn validate_description(description: &PipelineDescription) -> Result<(), Vec<ValidationError>> {
    ValidationStarted {
        stage_count: description.stages.len(),
        edge_count: description.edges.len(),
    }
    .log();

    let mut errors = Vec::new();

    if let Err(e) = validate_unique_stage_ids(description) {
        errors.extend(e);
    }

    if let Err(e) = validate_references(description) {
        errors.extend(e);
    }

    if let Err(e) = validate_error_fields(description) {
        errors.extend(e);
    }

    if errors.is_empty() {
        if let Err(e) = validate_ranges(description) {
            errors.extend(e);
        }
    }

    if errors.is_empty() {
        if let Err(e) = validate_acyclic_graph(description) {
            errors.extend(e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_unique_stage_ids(description: &PipelineDescription) -> Result<(), Vec<ValidationError>> {
    let mut seen_ids = HashSet::new();
    let mut errors = Vec::new();

    for stage in &description.stages {
        if !seen_ids.insert(&stage.id) {
            errors.push(ValidationError::DuplicateStageId {
                stage_id: stage.id.clone(),
            });
        }
        if stage.copies == 0 {
            errors.push(ValidationError::NoCopies {
                stage_id: stage.id.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_references(description: &PipelineDescription) -> Result<(), Vec<ValidationError>> {
    let stage_ids: HashSet<&str> = description.stages.iter().map(|s| s.id.as_str()).collect();
    let mut errors = Vec::new();

    for edge in &description.edges {
        for endpoint in [&edge.from, &edge.to] {
            if !stage_ids.contains(endpoint.as_str()) {
                errors.push(ValidationError::UnresolvedStage {
                    edge: edge.label(),
                    missing_stage: endpoint.clone(),
                });
            }
        }
    }

    for stage in &description.stages {
        if let Some(handling) = &stage.error_handling {
            if !stage_ids.contains(handling.target.as_str()) {
                errors.push(ValidationError::UnresolvedErrorTarget {
                    stage_id: stage.id.clone(),
                    target: handling.target.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_error_fields(description: &PipelineDescription) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for stage in &description.stages {
        let Some(handling) = &stage.error_handling else {
            continue;
        };
        let names: Vec<&str> = handling.error_field_names().collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].iter().any(|n| n.eq_ignore_ascii_case(name)) {
                errors.push(ValidationError::DuplicateErrorField {
                    stage_id: stage.id.clone(),
                    field: name.to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_ranges(description: &PipelineDescription) -> Result<(), Vec<ValidationError>> {
    let copies: HashMap<&str, usize> = description
        .stages
        .iter()
        .map(|s| (s.id.as_str(), s.copies))
        .collect();
    let mut errors = Vec::new();

    if description.options.queue_capacity == Some(0) {
        errors.push(ValidationError::ZeroCapacity {
            edge: "default".to_string(),
        });
    }

    for edge in &description.edges {
        if edge.capacity == Some(0) {
            errors.push(ValidationError::ZeroCapacity { edge: edge.label() });
        }
        for (stage_id, copy) in [(&edge.from, edge.from_copy), (&edge.to, edge.to_copy)] {
            let available = copies.get(stage_id.as_str()).copied().unwrap_or(0);
            if let Some(copy) = copy {
                if copy >= available {
                    errors.push(ValidationError::CopyOutOfRange {
                        stage_id: stage_id.clone(),
                        copy,
                        copies: available,
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// DFS with a recursion stack; a link back into the stack closes a cycle,
/// which is reported with its full path.
fn validate_acyclic_graph(description: &PipelineDescription) -> Result<(), Vec<ValidationError>> {
    let graph = StageGraph::from_description(description);

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for stage in &description.stages {
        if !visited.contains(stage.id.as_str()) {
            if let Some(cycle) =
                dfs_cycle_detection(&stage.id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                let names: Vec<&str> = cycle.iter().map(String::as_str).collect();
                CyclicDependencyDetected { cycle: &names }.log();
                return Err(vec![ValidationError::CyclicDependency { cycle }]);
            }
        }
    }

    Ok(())
}

fn dfs_cycle_detection(
    node: &str,
    graph: &StageGraph,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(neighbors) = graph.downstream(node) {
        for neighbor in neighbors {
            if !visited.contains(neighbor) {
                if let Some(cycle) = dfs_cycle_detection(neighbor, graph, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(neighbor) {
                let cycle_start = path.iter().position(|x| x == neighbor).unwrap_or(0);
                let mut cycle = path[cycle_start..].to_vec();
                cycle.push(neighbor.clone());
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}
