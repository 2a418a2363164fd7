//! Bitemporal interval model and point-resolution engine.
//!
//! Records carry a valid-time interval and a transaction-time interval. The kernel
//! loads validated histories ([`TemporalDataset`]), answers "which versions were in
//! force at this (transaction, valid) point" ([`matcher`]), projects histories onto
//! the (valid, transaction) plane ([`projector`]), inverts plane coordinates back
//! into temporal points ([`scale`]), and fans a single cursor out across several
//! datasets ([`selection`]). Everything here is synchronous and free of I/O.

use serde::{Deserialize, Serialize};

pub mod dataset;
pub mod instant;
pub mod matcher;
pub mod model;
pub mod projector;
pub mod scale;
pub mod selection;

pub use dataset::{TableRow, TemporalDataset};
pub use instant::{format_caption_date, format_instant, parse_instant, Instant};
pub use matcher::{match_dataset, match_dataset_with_report, match_records, MatchReport};
pub use model::{
    display_value, Axis, DatasetSchema, EntityKey, Interval, RecordId, RecordStatus,
    TemporalRecord, TemporalRow, UpperBound,
};
pub use projector::{
    project, AxisSpan, PlaneBounds, PlaneRectangle, Projection, ProjectionOptions,
    ReferenceLines,
};
pub use scale::{AxisScale, PointInverter, TemporalPoint};
pub use selection::{Highlights, PointerEvent, RenderSink, SelectionSynchronizer, SelectionUpdate};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("dataset `{dataset}` rejected: {source}")]
    Malformed {
        dataset: String,
        #[source]
        source: MalformedRecordError,
    },
    #[error("schema error: {0}")]
    Schema(String),
    #[error("invalid plane coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("invalid axis scale: {0}")]
    InvalidScale(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// A row or a group of rows violates the bitemporal data model.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum MalformedRecordError {
    #[error("record {record_id} is missing mandatory lower bound `{column}`")]
    MissingLowerBound { record_id: RecordId, column: &'static str },
    #[error("record {record_id} has an empty {axis} interval [{from}, {to})")]
    EmptyInterval { record_id: RecordId, axis: Axis, from: Instant, to: UpperBound },
    #[error("record id {record_id} appears more than once")]
    DuplicateRecordId { record_id: RecordId },
    #[error("record {record_id} columns {found:?} do not match schema attributes {expected:?}")]
    ColumnMismatch { record_id: RecordId, expected: Vec<String>, found: Vec<String> },
    #[error(
        "entity {entity_key}: records {first} and {second} cover the same bitemporal region"
    )]
    OverlappingCoverage { entity_key: EntityKey, first: RecordId, second: RecordId },
    #[error(
        "entity {entity_key}: transaction coverage has a gap between {closed_at} and {resumes_at}"
    )]
    TransactionGap { entity_key: EntityKey, closed_at: Instant, resumes_at: Instant },
    #[error("entity {entity_key}: no version has an open transaction interval")]
    NoCurrentVersion { entity_key: EntityKey },
}

/// More than one version of one entity answered a single temporal point.
///
/// Diagnostic only: the matcher still returns every match.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, Eq, PartialEq)]
#[error("entity {entity_key} has {} versions in force at {point}: {record_ids:?}", .record_ids.len())]
pub struct AmbiguousMatchError {
    pub entity_key: EntityKey,
    pub point: TemporalPoint,
    pub record_ids: Vec<RecordId>,
}
