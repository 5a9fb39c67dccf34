use std::collections::HashMap;

use crate::config::PipelineDescription;

/// Newtype wrapper for the stage-level graph: stage id -> downstream stage ids.
///
/// Both regular edges and error-handling targets count as downstream links.
/// Every stage of the description has an entry, possibly empty.
#[derive(Debug, Clone, Default)]
pub struct StageGraph(pub HashMap<String, Vec<String>>);

impl StageGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Build the graph from a description. Links to unknown stages are kept,
    /// validation reports them.
    pub fn from_description(description: &PipelineDescription) -> Self {
        let mut graph = Self::new();
        for stage in &description.stages {
            graph.0.entry(stage.id.clone()).or_default();
        }
        for edge in &description.edges {
            graph.add_link(&edge.from, &edge.to);
        }
        for stage in &description.stages {
            if let Some(handling) = &stage.error_handling {
                graph.add_link(&stage.id, &handling.target);
            }
        }
        graph
    }

    /// Add a downstream link, ignoring duplicates
    pub fn add_link(&mut self, from: &str, to: &str) {
        let downstream = self.0.entry(from.to_string()).or_default();
        if !downstream.iter().any(|d| d == to) {
            downstream.push(to.to_string());
        }
    }

    /// Get downstream stages of a stage
    pub fn downstream(&self, stage_id: &str) -> Option<&Vec<String>> {
        self.0.get(stage_id)
    }
}
