use std::collections::HashMap;
use std::sync::Arc;

use crate::config::StageConfig;
use crate::errors::PipelineError;
use crate::stages;
use crate::traits::{Transform, TransformFactory};

/// Maps a stage type identifier to the factory creating its transforms.
///
/// New stage types register a factory here; the executor never needs to know
/// about them.
#[derive(Clone, Default)]
pub struct TransformRegistry(HashMap<String, Arc<dyn TransformFactory>>);

impl TransformRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Create a registry holding the built-in stage types
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        stages::register_builtins(&mut registry);
        registry
    }

    /// Register (or replace) the factory for a stage type
    pub fn register<F>(&mut self, stage_type: impl Into<String>, factory: F)
    where
        F: TransformFactory + 'static,
    {
        self.0.insert(stage_type.into(), Arc::new(factory));
    }

    /// Check if a stage type is registered
    pub fn contains(&self, stage_type: &str) -> bool {
        self.0.contains_key(stage_type)
    }

    /// All registered stage types, sorted
    pub fn stage_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.0.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Create the transform for one copy of a stage
    pub fn create(&self, config: &StageConfig, copy: usize) -> Result<Box<dyn Transform>, PipelineError> {
        let factory = self.0.get(&config.stage_type).ok_or_else(|| {
            PipelineError::configuration(
                &config.id,
                format!("no transform registered for type '{}'", config.stage_type),
            )
        })?;
        factory.create(config, copy)
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("stage_types", &self.stage_types())
            .finish()
    }
}
