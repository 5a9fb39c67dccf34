pub mod transform;

pub use transform::{RowFailure, StepOutcome, Transform, TransformFactory};
