// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end pipeline runs over the built-in stages plus a few test stages.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::config::{
    DataMovement, EdgeConfig, ErrorHandlingConfig, PipelineDescription, PipelineOptions,
    StageConfig, TransformRegistry,
};
use crate::engine::{Pipeline, RunState, StageState};
use crate::errors::{PipelineError, RowError, ValidationError};
use crate::row::{DataType, FieldMeta, Row, Schema, Value};
use crate::traits::{StepOutcome, Transform};

type Sink = Arc<Mutex<Vec<Row>>>;

/// Records every row it sees and passes it on.
struct Collector {
    rows: Sink,
}

#[async_trait]
impl Transform for Collector {
    fn name(&self) -> &'static str {
        "collect"
    }

    async fn step(&mut self, input: Option<Row>) -> StepOutcome {
        match input {
            Some(row) => {
                self.rows.lock().unwrap().push(row.clone());
                StepOutcome::emit(row)
            }
            None => StepOutcome::NoMoreInput,
        }
    }
}

/// Fails rows whose `id` field equals 3.
struct FailOnThree {
    position: usize,
}

#[async_trait]
impl Transform for FailOnThree {
    fn name(&self) -> &'static str {
        "fail_on_three"
    }

    fn target_fields(&self) -> Vec<String> {
        vec!["id".to_string()]
    }

    fn bind(&mut self, _schema: &Schema, positions: &[usize]) -> Result<(), PipelineError> {
        self.position = positions[0];
        Ok(())
    }

    async fn step(&mut self, input: Option<Row>) -> StepOutcome {
        let Some(row) = input else {
            return StepOutcome::NoMoreInput;
        };
        if row.get(self.position).and_then(Value::as_i64) == Some(3) {
            return StepOutcome::failed("TST001", RowError::runtime("three is not allowed"));
        }
        StepOutcome::emit(row)
    }
}

/// Source that never runs out of rows.
struct Forever {
    next: i64,
}

#[async_trait]
impl Transform for Forever {
    fn name(&self) -> &'static str {
        "forever"
    }

    fn output_schema(&self, _input: Schema) -> Result<Schema, PipelineError> {
        Schema::from_fields(vec![FieldMeta::new("id", DataType::Integer)])
            .map_err(|e| PipelineError::configuration("forever", e))
    }

    async fn step(&mut self, _input: Option<Row>) -> StepOutcome {
        self.next += 1;
        StepOutcome::emit(Row::new(vec![Value::Integer(self.next)]))
    }
}

struct Harness {
    registry: TransformRegistry,
    collected: Sink,
    rejected: Sink,
}

impl Harness {
    fn new() -> Self {
        let collected: Sink = Arc::default();
        let rejected: Sink = Arc::default();
        let mut registry = TransformRegistry::with_builtins();

        let sink = collected.clone();
        registry.register(
            "collect",
            move |_: &StageConfig, _: usize| -> Result<Box<dyn Transform>, PipelineError> {
                Ok(Box::new(Collector { rows: sink.clone() }))
            },
        );
        let sink = rejected.clone();
        registry.register(
            "collect_rejected",
            move |_: &StageConfig, _: usize| -> Result<Box<dyn Transform>, PipelineError> {
                Ok(Box::new(Collector { rows: sink.clone() }))
            },
        );
        registry.register(
            "fail_on_three",
            |_: &StageConfig, _: usize| -> Result<Box<dyn Transform>, PipelineError> {
                Ok(Box::new(FailOnThree { position: 0 }))
            },
        );
        registry.register(
            "forever",
            |_: &StageConfig, _: usize| -> Result<Box<dyn Transform>, PipelineError> {
                Ok(Box::new(Forever { next: 0 }))
            },
        );

        Self {
            registry,
            collected,
            rejected,
        }
    }

    fn build(&self, stages: Vec<StageConfig>, edges: Vec<EdgeConfig>) -> Pipeline {
        Pipeline::build(&description(stages, edges), &self.registry).unwrap()
    }

    fn collected_ids(&self) -> Vec<i64> {
        ids(&self.collected.lock().unwrap())
    }

    fn rejected_ids(&self) -> Vec<i64> {
        ids(&self.rejected.lock().unwrap())
    }
}

fn description(stages: Vec<StageConfig>, edges: Vec<EdgeConfig>) -> PipelineDescription {
    PipelineDescription {
        name: "test".to_string(),
        options: PipelineOptions::default(),
        stages,
        edges,
    }
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .filter_map(|row| row.get(0).and_then(Value::as_i64))
        .collect()
}

/// `rows` source emitting ids 1..=count.
fn source(id: &str, count: i64) -> StageConfig {
    let data: Vec<Vec<String>> = (1..=count).map(|n| vec![n.to_string()]).collect();
    StageConfig::new(id, "rows")
        .with_option("fields", serde_yaml::from_str("[{ name: id, type: integer }]").unwrap())
        .with_option("data", serde_yaml::to_value(data).unwrap())
}

#[tokio::test]
async fn test_passthrough_preserves_rows_and_order() {
    let harness = Harness::new();
    let mut pipeline = harness.build(
        vec![
            source("read", 3),
            StageConfig::new("pass", "dummy"),
            StageConfig::new("out", "collect"),
        ],
        vec![EdgeConfig::new("read", "pass"), EdgeConfig::new("pass", "out")],
    );
    assert_eq!(pipeline.run_state(), RunState::Prepared);

    let status = pipeline.execute().await.unwrap();

    assert_eq!(harness.collected_ids(), vec![1, 2, 3]);
    assert_eq!((status.rows_in, status.rows_out), (3, 3));
    assert_eq!(status.errors, 0);
    assert!(!status.aborted);
    assert!(status.stages.iter().all(|s| s.state == StageState::Finished));
    assert_eq!(pipeline.run_state(), RunState::Finished);
    assert!(pipeline.row_sets().iter().all(|rs| rs.is_done() && rs.size() == 0));
}

#[tokio::test]
async fn test_failed_row_is_diverted() {
    let harness = Harness::new();
    let mut pipeline = harness.build(
        vec![
            source("read", 5),
            StageConfig::new("check", "fail_on_three")
                .with_error_handling(ErrorHandlingConfig::new("rejects")),
            StageConfig::new("out", "collect"),
            StageConfig::new("rejects", "collect_rejected"),
        ],
        vec![EdgeConfig::new("read", "check"), EdgeConfig::new("check", "out")],
    );

    let status = pipeline.execute().await.unwrap();

    assert_eq!(harness.collected_ids(), vec![1, 2, 4, 5]);
    assert_eq!(harness.rejected_ids(), vec![3]);
    assert_eq!(status.errors, 1);
    assert!(!status.aborted);

    let check = pipeline.stage_status("check").unwrap();
    assert_eq!((check.read, check.written, check.rejected, check.errors), (5, 4, 1, 0));
}

/// `rows` source over one integer column `id` with the given cells.
fn source_with_cells(id: &str, cells: &str) -> StageConfig {
    StageConfig::new(id, "rows")
        .with_option("fields", serde_yaml::from_str("[{ name: id, type: integer }]").unwrap())
        .with_option("data", serde_yaml::from_str(cells).unwrap())
}

#[tokio::test]
async fn test_unconvertible_cell_is_diverted_as_conversion_error() {
    let harness = Harness::new();
    let mut handling = ErrorHandlingConfig::new("rejects");
    handling.fields_field = Some("error_field".into());
    handling.codes_field = Some("error_code".into());

    let mut pipeline = harness.build(
        vec![
            source_with_cells("read", "[['1'], ['2'], [x], ['4'], ['5']]").with_error_handling(handling),
            StageConfig::new("out", "collect"),
            StageConfig::new("rejects", "collect_rejected"),
        ],
        vec![EdgeConfig::new("read", "out")],
    );

    let status = pipeline.execute().await.unwrap();

    assert_eq!(harness.collected_ids(), vec![1, 2, 4, 5]);
    assert_eq!(status.errors, 1);
    assert!(!status.aborted);

    let rejected = harness.rejected.lock().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].values(), &[Value::from("id"), Value::from("RWS001")]);

    let read = pipeline.stage_status("read").unwrap();
    assert_eq!((read.written, read.rejected), (4, 1));
}

#[tokio::test]
async fn test_percent_threshold_applies_to_sources() {
    let harness = Harness::new();
    let mut handling = ErrorHandlingConfig::new("rejects");
    handling.max_percent_errors = Some(10.0);
    handling.min_percent_rows = Some(1);

    let mut pipeline = harness.build(
        vec![
            source_with_cells("read", "[[x], [y], [z], [w]]").with_error_handling(handling),
            StageConfig::new("rejects", "collect_rejected"),
        ],
        vec![],
    );

    let status = pipeline.execute().await.unwrap();

    assert!(status.aborted);
    assert_eq!(status.errors, 1);
    assert!(harness.rejected.lock().unwrap().is_empty());
    assert_eq!(pipeline.stage_status("read").unwrap().state, StageState::Aborted);
}

#[tokio::test]
async fn test_error_field_named_like_input_field_is_still_diverted() {
    let harness = Harness::new();
    let mut handling = ErrorHandlingConfig::new("rejects");
    handling.description_field = Some("id".into());

    let mut pipeline = harness.build(
        vec![
            source("read", 4),
            StageConfig::new("check", "fail_on_three").with_error_handling(handling),
            StageConfig::new("rejects", "collect_rejected"),
        ],
        vec![EdgeConfig::new("read", "check")],
    );

    let status = pipeline.execute().await.unwrap();

    assert!(!status.aborted);
    assert_eq!(status.errors, 1);
    assert_eq!(
        harness.rejected.lock().unwrap().clone(),
        vec![Row::new(vec![Value::Integer(3), Value::from("three is not allowed")])]
    );
}

#[tokio::test]
async fn test_diverted_row_carries_configured_error_fields() {
    let harness = Harness::new();
    let mut handling = ErrorHandlingConfig::new("rejects");
    handling.description_field = Some("error_description".into());
    handling.codes_field = Some("error_code".into());

    let mut pipeline = harness.build(
        vec![
            source("read", 4),
            StageConfig::new("check", "fail_on_three").with_error_handling(handling),
            StageConfig::new("rejects", "collect_rejected"),
        ],
        vec![EdgeConfig::new("read", "check")],
    );
    pipeline.execute().await.unwrap();

    let rejected = harness.rejected.lock().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(
        rejected[0].values(),
        &[
            Value::Integer(3),
            Value::from("three is not allowed"),
            Value::from("TST001"),
        ]
    );
}

#[tokio::test]
async fn test_failure_without_handler_aborts() {
    let harness = Harness::new();
    let mut pipeline = harness.build(
        vec![
            source("read", 5),
            StageConfig::new("check", "fail_on_three"),
            StageConfig::new("out", "collect"),
        ],
        vec![EdgeConfig::new("read", "check"), EdgeConfig::new("check", "out")],
    );

    let status = timeout(Duration::from_secs(5), pipeline.execute())
        .await
        .expect("aborted pipeline must finish")
        .unwrap();

    assert!(status.aborted);
    assert_eq!(status.errors, 1);

    let check = pipeline.stage_status("check").unwrap();
    assert_eq!(check.state, StageState::Aborted);
    assert_eq!((check.written, check.errors), (2, 1));

    // Rows queued before the abort still reach the sink.
    assert_eq!(harness.collected_ids(), vec![1, 2]);
    assert_eq!(pipeline.stage_status("out").unwrap().read, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abort_drains_queued_rows_on_worker_threads() {
    for _ in 0..20 {
        let harness = Harness::new();
        let mut pipeline = harness.build(
            vec![
                source("read", 5),
                StageConfig::new("check", "fail_on_three"),
                StageConfig::new("out", "collect"),
            ],
            vec![EdgeConfig::new("read", "check"), EdgeConfig::new("check", "out")],
        );

        let status = timeout(Duration::from_secs(5), pipeline.execute())
            .await
            .expect("aborted pipeline must finish")
            .unwrap();
        assert!(status.aborted);
        assert_eq!(harness.collected_ids(), vec![1, 2]);
    }
}

#[tokio::test]
async fn test_error_threshold_stops_pipeline() {
    let harness = Harness::new();
    let mut handling = ErrorHandlingConfig::new("rejects");
    handling.max_errors = Some(0);

    let mut pipeline = harness.build(
        vec![
            source("read", 5),
            StageConfig::new("check", "fail_on_three").with_error_handling(handling),
            StageConfig::new("rejects", "collect_rejected"),
        ],
        vec![EdgeConfig::new("read", "check")],
    );

    let status = pipeline.execute().await.unwrap();
    assert!(status.aborted);
    assert_eq!(status.errors, 1);
    assert!(harness.rejected_ids().is_empty());
}

#[tokio::test]
async fn test_disabled_error_handling_aborts() {
    let harness = Harness::new();
    let mut handling = ErrorHandlingConfig::new("rejects");
    handling.enabled = false;

    let mut pipeline = harness.build(
        vec![
            source("read", 5),
            StageConfig::new("check", "fail_on_three").with_error_handling(handling),
            StageConfig::new("rejects", "collect_rejected"),
        ],
        vec![EdgeConfig::new("read", "check")],
    );

    let status = pipeline.execute().await.unwrap();
    assert!(status.aborted);
    assert!(harness.rejected_ids().is_empty());
}

#[tokio::test]
async fn test_duplicate_target_field_fails_before_any_row() {
    let harness = Harness::new();
    let duplicate = StageConfig::new("defaults", "set_constant").with_option(
        "fields",
        serde_yaml::from_str("[{ name: id, value: '1' }, { name: ID, value: '2' }]").unwrap(),
    );
    let mut pipeline = harness.build(
        vec![source("read", 3), duplicate, StageConfig::new("out", "collect")],
        vec![EdgeConfig::new("read", "defaults"), EdgeConfig::new("defaults", "out")],
    );

    let err = pipeline.start().unwrap_err();
    assert!(err.is_configuration());

    let status = pipeline.wait_until_finished().await.unwrap();
    assert!(status.aborted);
    assert_eq!(status.errors, 1);
    assert_eq!((status.rows_in, status.rows_out), (0, 0));
    assert!(status.stages.iter().all(|s| s.read == 0 && s.written == 0));
    assert!(harness.collected_ids().is_empty());
    assert_eq!(pipeline.run_state(), RunState::Finished);
}

#[tokio::test]
async fn test_stop_ends_infinite_pipeline() {
    let harness = Harness::new();
    let mut pipeline = harness.build(
        vec![StageConfig::new("gen", "forever"), StageConfig::new("out", "dummy")],
        vec![EdgeConfig::new("gen", "out").with_capacity(1)],
    );

    pipeline.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    pipeline.stop();
    assert_eq!(pipeline.run_state(), RunState::Stopped);

    let status = timeout(Duration::from_secs(5), pipeline.wait_until_finished())
        .await
        .expect("stopped pipeline must finish")
        .unwrap();
    assert!(!status.aborted);
    assert!(status.rows_in > 0);
}

#[tokio::test]
async fn test_safe_stop_drains_downstream() {
    let harness = Harness::new();
    let mut pipeline = harness.build(
        vec![StageConfig::new("gen", "forever"), StageConfig::new("out", "dummy")],
        vec![EdgeConfig::new("gen", "out").with_capacity(4)],
    );
    let handle = pipeline.stop_handle();

    pipeline.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.safe_stop();

    let status = timeout(Duration::from_secs(5), pipeline.wait_until_finished())
        .await
        .expect("safe-stopped pipeline must finish")
        .unwrap();

    assert_eq!(status.rows_in, status.rows_out);
    assert_eq!(pipeline.stage_status("gen").unwrap().state, StageState::Stopped);
    assert_eq!(pipeline.stage_status("out").unwrap().state, StageState::Finished);
}

#[tokio::test]
async fn test_schema_divergence_is_diverted() {
    let harness = Harness::new();
    let names = StageConfig::new("names", "rows")
        .with_option("fields", serde_yaml::from_str("[{ name: name, type: string }]").unwrap())
        .with_option("data", serde_yaml::from_str("[[a], [b]]").unwrap());

    let mut pipeline = harness.build(
        vec![
            source("ids", 2),
            names,
            StageConfig::new("merge", "collect").with_error_handling(ErrorHandlingConfig::new("rejects")),
            StageConfig::new("rejects", "collect_rejected"),
        ],
        vec![EdgeConfig::new("ids", "merge"), EdgeConfig::new("names", "merge")],
    );

    let status = pipeline.execute().await.unwrap();

    assert_eq!(harness.collected.lock().unwrap().len(), 2);
    assert_eq!(harness.rejected.lock().unwrap().len(), 2);
    assert_eq!(status.errors, 2);
    assert!(!status.aborted);
}

#[tokio::test]
async fn test_copy_and_distribute_movement() {
    let harness = Harness::new();
    let mut pipeline = harness.build(
        vec![
            source("read", 6).with_data_movement(DataMovement::Distribute),
            StageConfig::new("left", "collect"),
            StageConfig::new("right", "collect_rejected"),
        ],
        vec![EdgeConfig::new("read", "left"), EdgeConfig::new("read", "right")],
    );
    pipeline.execute().await.unwrap();
    assert_eq!(harness.collected_ids(), vec![1, 3, 5]);
    assert_eq!(harness.rejected_ids(), vec![2, 4, 6]);

    let harness = Harness::new();
    let mut pipeline = harness.build(
        vec![
            source("read", 3),
            StageConfig::new("left", "collect"),
            StageConfig::new("right", "collect_rejected"),
        ],
        vec![EdgeConfig::new("read", "left"), EdgeConfig::new("read", "right")],
    );
    let status = pipeline.execute().await.unwrap();
    assert_eq!(harness.collected_ids(), vec![1, 2, 3]);
    assert_eq!(harness.rejected_ids(), vec![1, 2, 3]);
    assert_eq!((status.rows_in, status.rows_out), (3, 6));
}

#[tokio::test]
async fn test_stage_copies_share_the_work() {
    let harness = Harness::new();
    let mut pipeline = harness.build(
        vec![
            source("read", 10).with_data_movement(DataMovement::Distribute),
            StageConfig::new("pass", "dummy").with_copies(2),
            StageConfig::new("out", "collect"),
        ],
        vec![EdgeConfig::new("read", "pass"), EdgeConfig::new("pass", "out")],
    );
    assert_eq!(pipeline.row_sets().len(), 4);

    let status = pipeline.execute().await.unwrap();

    let mut ids = harness.collected_ids();
    ids.sort_unstable();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    assert_eq!(status.stages.iter().filter(|s| s.stage == "pass").count(), 2);
    assert_eq!(pipeline.stage_status("pass").unwrap().read, 10);
}

#[tokio::test]
async fn test_diamond_completes() {
    let harness = Harness::new();
    let mut pipeline = harness.build(
        vec![
            source("read", 100),
            StageConfig::new("left", "dummy"),
            StageConfig::new("right", "dummy"),
            StageConfig::new("join", "collect"),
        ],
        vec![
            EdgeConfig::new("read", "left").with_capacity(1),
            EdgeConfig::new("read", "right").with_capacity(1),
            EdgeConfig::new("left", "join").with_capacity(1),
            EdgeConfig::new("right", "join").with_capacity(1),
        ],
    );

    let status = timeout(Duration::from_secs(5), pipeline.execute())
        .await
        .expect("diamond must not deadlock")
        .unwrap();
    assert_eq!(status.rows_out, 200);
}

#[test]
fn test_unknown_stage_type_is_rejected() {
    let harness = Harness::new();
    let err = Pipeline::build(
        &description(vec![StageConfig::new("x", "teleport")], vec![]),
        &harness.registry,
    )
    .err()
    .unwrap();

    match err {
        PipelineError::Validation(errors) => assert_eq!(
            errors,
            vec![ValidationError::UnknownStageType {
                stage_id: "x".into(),
                stage_type: "teleport".into()
            }]
        ),
        other => panic!("expected validation error, got {}", other),
    }
}

#[tokio::test]
async fn test_lifecycle_misuse() {
    let harness = Harness::new();
    let mut pipeline = harness.build(vec![source("read", 1)], vec![]);

    assert!(matches!(
        pipeline.wait_until_finished().await,
        Err(PipelineError::InvalidState(_))
    ));
    pipeline.start().unwrap();
    assert!(matches!(pipeline.start(), Err(PipelineError::InvalidState(_))));
    pipeline.wait_until_finished().await.unwrap();
}
