//! Point-in-rectangle resolution on the bitemporal plane.
//!
//! A record answers `(transaction, valid)` iff
//! `tran_from <= t < tran_to` and `valid_from <= v < valid_to`, open upper bounds
//! admitting every later instant.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dataset::TemporalDataset;
use crate::model::{EntityKey, RecordId, TemporalRecord};
use crate::scale::TemporalPoint;
use crate::AmbiguousMatchError;

/// Every record in force at `point`, plus per-entity ambiguity diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct MatchReport {
    pub record_ids: BTreeSet<RecordId>,
    pub ambiguities: Vec<AmbiguousMatchError>,
}

impl MatchReport {
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguities.is_empty()
    }
}

/// Records in force at `point`. An empty set is a normal answer.
#[must_use]
pub fn match_records(records: &[TemporalRecord], point: TemporalPoint) -> BTreeSet<RecordId> {
    records
        .iter()
        .filter(|record| record.is_in_force(point.transaction, point.valid))
        .map(|record| record.record_id)
        .collect()
}

#[must_use]
pub fn match_dataset(dataset: &TemporalDataset, point: TemporalPoint) -> BTreeSet<RecordId> {
    match_records(dataset.records(), point)
}

/// Like [`match_dataset`], additionally reporting entities answered by more than
/// one version. Ambiguities are logged and never suppress a match.
#[must_use]
pub fn match_dataset_with_report(dataset: &TemporalDataset, point: TemporalPoint) -> MatchReport {
    let report = report_records(dataset.records(), point);
    for ambiguity in &report.ambiguities {
        tracing::warn!(
            dataset = dataset.name(),
            entity_key = %ambiguity.entity_key,
            point = %ambiguity.point,
            record_ids = ?ambiguity.record_ids,
            "ambiguous temporal match"
        );
    }
    report
}

fn report_records(records: &[TemporalRecord], point: TemporalPoint) -> MatchReport {
    let mut by_entity: BTreeMap<&EntityKey, Vec<RecordId>> = BTreeMap::new();
    for record in records.iter().filter(|record| record.is_in_force(point.transaction, point.valid))
    {
        by_entity.entry(&record.entity_key).or_default().push(record.record_id);
    }

    let mut report = MatchReport::default();
    for (entity_key, record_ids) in by_entity {
        report.record_ids.extend(record_ids.iter().copied());
        if record_ids.len() > 1 {
            report.ambiguities.push(AmbiguousMatchError {
                entity_key: entity_key.clone(),
                point,
                record_ids,
            });
        }
    }
    report
}
