// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-stage diversion of failed rows to an error queue.
//!
//! An error row is the failed input row followed by the optional diagnostic
//! fields the handler is configured with, in this order: error count, error
//! description, offending field names, error codes. The schema of the error
//! stream is derived from the input schema the first time it is needed and
//! reused while the input schema stays the same.

use std::sync::Arc;

use crate::config::ErrorHandlingConfig;
use crate::engine::rowset::{Record, RowSetWriter};
use crate::errors::RowSetError;
use crate::row::{DataType, FieldMeta, Row, Schema, Value};
use crate::traits::RowFailure;

/// What happened to a failed row handed to the error handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Diversion {
    /// The row was written to the error queue.
    Diverted,
    /// Diverting the row would exceed the configured threshold, described by
    /// the contained text. The row was not written.
    ThresholdExceeded(String),
    /// The error queue is closed; the pipeline is shutting down.
    Closed,
}

#[derive(Debug)]
pub struct ErrorHandler {
    config: ErrorHandlingConfig,
    writer: RowSetWriter,
    rejected: u64,
    input_schema: Option<Arc<Schema>>,
    error_schema: Option<Arc<Schema>>,
}

impl ErrorHandler {
    pub fn new(config: ErrorHandlingConfig, writer: RowSetWriter) -> Self {
        Self {
            config,
            writer,
            rejected: 0,
            input_schema: None,
            error_schema: None,
        }
    }

    /// Rows diverted so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Divert a failed row.
    ///
    /// `record` is the input row that failed, `None` for source stages.
    /// `processed` is the number of rows the stage has handled so far, the
    /// failed one included: rows read, or rows produced by a source. It is
    /// the base of the percentage threshold.
    pub async fn divert(&mut self, record: Option<Record>, failure: &RowFailure, processed: u64) -> Diversion {
        if let Some(threshold) = self.exceeded_threshold(self.rejected + 1, processed) {
            return Diversion::ThresholdExceeded(threshold);
        }

        let error_record = self.error_record(record, failure);
        match self.writer.put(error_record).await {
            Ok(()) => {
                self.rejected += 1;
                Diversion::Diverted
            }
            Err(RowSetError::Closed) | Err(RowSetError::Cancelled) => Diversion::Closed,
        }
    }

    /// Declare the error queue finished. Idempotent.
    pub fn mark_done(&mut self) {
        self.writer.mark_done();
    }

    fn exceeded_threshold(&self, rejected: u64, processed: u64) -> Option<String> {
        if let Some(max_errors) = self.config.max_errors {
            if rejected > max_errors {
                return Some(format!("max_errors={}", max_errors));
            }
        }

        if let Some(max_percent) = self.config.max_percent_errors {
            let min_rows = self.config.min_percent_rows.unwrap_or(0);
            if processed > 0 && processed >= min_rows {
                let percent = rejected as f64 * 100.0 / processed as f64;
                if percent > max_percent {
                    return Some(format!("max_percent_errors={}%", max_percent));
                }
            }
        }

        None
    }

    fn error_record(&mut self, record: Option<Record>, failure: &RowFailure) -> Record {
        let (input_schema, row) = match record {
            Some(record) => (record.schema, record.row),
            None => (Arc::new(Schema::new()), Row::default()),
        };

        let schema = self.error_schema_for(&input_schema);

        let mut row = row;
        if self.config.count_field.is_some() {
            row.push(Value::Integer(1));
        }
        if self.config.description_field.is_some() {
            row.push(Value::String(failure.error.to_string()));
        }
        if self.config.fields_field.is_some() {
            row.push(failure.error.field().map(Value::from).unwrap_or(Value::Null));
        }
        if self.config.codes_field.is_some() {
            row.push(Value::String(failure.code.clone()));
        }

        Record::new(schema, row)
    }

    fn error_schema_for(&mut self, input: &Arc<Schema>) -> Arc<Schema> {
        if let (Some(known), Some(schema)) = (&self.input_schema, &self.error_schema) {
            if Arc::ptr_eq(known, input) || known.as_ref() == input.as_ref() {
                return schema.clone();
            }
        }

        let mut schema = input.as_ref().clone();
        let extra = [
            (&self.config.count_field, DataType::Integer),
            (&self.config.description_field, DataType::String),
            (&self.config.fields_field, DataType::String),
            (&self.config.codes_field, DataType::String),
        ];
        for (name, data_type) in extra {
            if let Some(name) = name {
                // Input fields keep their name; a clashing error field is renamed.
                schema.push_renamed(FieldMeta::new(name.clone(), data_type), "_error");
            }
        }

        let schema = Arc::new(schema);
        self.input_schema = Some(input.clone());
        self.error_schema = Some(schema.clone());
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rowset::{RowSet, RowSetId, RowSetReader};
    use crate::errors::RowError;
    use tokio_util::sync::CancellationToken;

    fn handler(config: ErrorHandlingConfig) -> (ErrorHandler, RowSetReader) {
        let (_shared, writer, reader) =
            RowSet::channel(RowSetId(0), "stage.0", "rejects.0", 16, CancellationToken::new());
        (ErrorHandler::new(config, writer), reader)
    }

    fn input() -> Record {
        let schema = Schema::from_fields(vec![FieldMeta::new("id", DataType::Integer)]).unwrap();
        Record::new(Arc::new(schema), Row::new(vec![Value::Integer(3)]))
    }

    fn failure() -> RowFailure {
        RowFailure::new(
            "SVC001",
            RowError::Conversion {
                field: "amount".into(),
                value: "abc".into(),
                target: DataType::Number,
                reason: "invalid float literal".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_diverted_row_carries_error_fields() {
        let mut config = ErrorHandlingConfig::new("rejects");
        config.count_field = Some("error_count".into());
        config.description_field = Some("error_description".into());
        config.fields_field = Some("error_fields".into());
        config.codes_field = Some("error_codes".into());
        let (mut handler, mut reader) = handler(config);

        assert_eq!(handler.divert(Some(input()), &failure(), 3).await, Diversion::Diverted);
        assert_eq!(handler.rejected(), 1);

        let record = reader.get().await.unwrap().unwrap();
        assert_eq!(
            record.schema.field_names(),
            vec!["id", "error_count", "error_description", "error_fields", "error_codes"]
        );
        assert_eq!(record.row.get(0), Some(&Value::Integer(3)));
        assert_eq!(record.row.get(1), Some(&Value::Integer(1)));
        assert!(record.row.get(2).and_then(Value::as_str).unwrap().contains("abc"));
        assert_eq!(record.row.get(3), Some(&Value::from("amount")));
        assert_eq!(record.row.get(4), Some(&Value::from("SVC001")));
    }

    #[tokio::test]
    async fn test_plain_diversion_keeps_input_row() {
        let (mut handler, mut reader) = handler(ErrorHandlingConfig::new("rejects"));
        handler.divert(Some(input()), &failure(), 1).await;

        let record = reader.get().await.unwrap().unwrap();
        assert_eq!(record, input());
    }

    #[tokio::test]
    async fn test_max_errors_threshold() {
        let mut config = ErrorHandlingConfig::new("rejects");
        config.max_errors = Some(2);
        let (mut handler, _reader) = handler(config);

        assert_eq!(handler.divert(Some(input()), &failure(), 1).await, Diversion::Diverted);
        assert_eq!(handler.divert(Some(input()), &failure(), 2).await, Diversion::Diverted);
        assert!(matches!(
            handler.divert(Some(input()), &failure(), 3).await,
            Diversion::ThresholdExceeded(_)
        ));
        assert_eq!(handler.rejected(), 2);
    }

    #[tokio::test]
    async fn test_percent_threshold_waits_for_min_rows() {
        let mut config = ErrorHandlingConfig::new("rejects");
        config.max_percent_errors = Some(10.0);
        config.min_percent_rows = Some(5);
        let (mut handler, _reader) = handler(config);

        // 1 of 2 rows is 50%, but fewer than 5 rows were read.
        assert_eq!(handler.divert(Some(input()), &failure(), 2).await, Diversion::Diverted);
        assert!(matches!(
            handler.divert(Some(input()), &failure(), 5).await,
            Diversion::ThresholdExceeded(_)
        ));
    }

    #[tokio::test]
    async fn test_closed_error_queue() {
        let (mut handler, reader) = handler(ErrorHandlingConfig::new("rejects"));
        drop(reader);
        assert_eq!(handler.divert(Some(input()), &failure(), 1).await, Diversion::Closed);
        assert_eq!(handler.rejected(), 0);
    }

    #[tokio::test]
    async fn test_source_failure_without_input_row() {
        let mut config = ErrorHandlingConfig::new("rejects");
        config.codes_field = Some("code".into());
        let (mut handler, mut reader) = handler(config);

        handler.divert(None, &failure(), 0).await;
        let record = reader.get().await.unwrap().unwrap();
        assert_eq!(record.schema.field_names(), vec!["code"]);
        assert_eq!(record.row.values(), &[Value::from("SVC001")]);
    }

    #[tokio::test]
    async fn test_error_field_clashing_with_input_is_renamed() {
        let mut config = ErrorHandlingConfig::new("rejects");
        config.description_field = Some("id".into());
        config.codes_field = Some("ID".into());
        let (mut handler, mut reader) = handler(config);

        handler.divert(Some(input()), &failure(), 1).await;
        let record = reader.get().await.unwrap().unwrap();
        assert_eq!(record.schema.field_names(), vec!["id", "id_error", "ID_error2"]);
        assert_eq!(record.row.len(), record.schema.len());
        assert_eq!(record.row.get(2), Some(&Value::from("SVC001")));
    }
}
