/// Capacity of a row set when neither the edge nor the pipeline sets one
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Name given to descriptions that don't declare one
pub const DEFAULT_PIPELINE_NAME: &str = "pipeline";
/// Error code attached to diverted rows whose stage didn't supply one
pub const DEFAULT_ERROR_CODE: &str = "ROW000";
/// Error code used when a row doesn't match the schema fixed by the first row
pub const SCHEMA_MISMATCH_ERROR_CODE: &str = "ROW001";
