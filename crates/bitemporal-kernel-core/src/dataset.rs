use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::instant::format_instant;
use crate::model::{
    display_value, DatasetSchema, EntityKey, Interval, RecordId, RecordStatus, TemporalRecord,
    TemporalRow, UpperBound, TRAN_FROM_COLUMN, VALID_FROM_COLUMN,
};
use crate::{KernelError, MalformedRecordError};

/// One entity type's complete, validated version history.
///
/// Immutable once loaded; a refresh builds a new dataset instead of editing this one.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TemporalDataset {
    schema: DatasetSchema,
    records: Vec<TemporalRecord>,
    fingerprint: String,
}

/// Display cells of one record in schema column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableRow {
    pub record_id: RecordId,
    pub status: RecordStatus,
    pub cells: Vec<String>,
}

impl TemporalDataset {
    /// Normalize and validate source rows into a dataset, preserving row order.
    ///
    /// Loading is all-or-nothing: the first violation rejects the whole dataset.
    ///
    /// # Errors
    /// Returns [`KernelError::Schema`] for an inconsistent schema and
    /// [`KernelError::Malformed`] when any row, or any entity's history, breaks the
    /// bitemporal data model.
    pub fn load<I>(schema: DatasetSchema, rows: I) -> Result<Self, KernelError>
    where
        I: IntoIterator<Item = TemporalRow>,
    {
        schema.validate()?;

        let mut seen_ids = BTreeSet::new();
        let mut records = Vec::new();
        for row in rows {
            let record = normalize_row(&schema, row).map_err(|source| rejected(&schema, source))?;
            if !seen_ids.insert(record.record_id) {
                return Err(rejected(
                    &schema,
                    MalformedRecordError::DuplicateRecordId { record_id: record.record_id },
                ));
            }
            records.push(record);
        }

        let entity_count =
            check_entity_histories(&records).map_err(|source| rejected(&schema, source))?;
        let fingerprint = fingerprint(&schema, &records);

        tracing::debug!(
            dataset = %schema.name,
            records = records.len(),
            entities = entity_count,
            fingerprint = %fingerprint,
            "loaded temporal dataset"
        );

        Ok(Self { schema, records, fingerprint })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    #[must_use]
    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    /// Records in source order.
    #[must_use]
    pub fn records(&self) -> &[TemporalRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, record_id: RecordId) -> Option<&TemporalRecord> {
        self.records.iter().find(|record| record.record_id == record_id)
    }

    /// `sha256:<hex>` digest of schema and records, stable across identical refreshes.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn entity_keys(&self) -> BTreeSet<&EntityKey> {
        self.records.iter().map(|record| &record.entity_key).collect()
    }

    /// Tabular form for row-oriented sinks; open upper bounds render as `-`.
    #[must_use]
    pub fn table_rows(&self) -> Vec<TableRow> {
        self.records
            .iter()
            .map(|record| {
                let mut cells = Vec::with_capacity(self.schema.attribute_columns.len() + 6);
                cells.push(record.record_id.to_string());
                cells.push(record.entity_key.to_string());
                for column in &self.schema.attribute_columns {
                    cells.push(record.attributes.get(column).map_or_else(
                        || "-".to_string(),
                        display_value,
                    ));
                }
                cells.push(format_instant(record.valid.from));
                cells.push(display_upper(record.valid.to));
                cells.push(format_instant(record.transaction.from));
                cells.push(display_upper(record.transaction.to));
                TableRow { record_id: record.record_id, status: record.status(), cells }
            })
            .collect()
    }
}

fn display_upper(bound: UpperBound) -> String {
    bound.closed().map_or_else(|| "-".to_string(), format_instant)
}

fn rejected(schema: &DatasetSchema, source: MalformedRecordError) -> KernelError {
    KernelError::Malformed { dataset: schema.name.clone(), source }
}

fn normalize_row(
    schema: &DatasetSchema,
    row: TemporalRow,
) -> Result<TemporalRecord, MalformedRecordError> {
    let record_id = row.record_id;
    let valid_from = row
        .valid_from
        .ok_or(MalformedRecordError::MissingLowerBound { record_id, column: VALID_FROM_COLUMN })?;
    let tran_from = row
        .tran_from
        .ok_or(MalformedRecordError::MissingLowerBound { record_id, column: TRAN_FROM_COLUMN })?;

    if !row.attributes.keys().eq(schema.attribute_columns.iter()) {
        return Err(MalformedRecordError::ColumnMismatch {
            record_id,
            expected: schema.attribute_columns.clone(),
            found: row.attributes.keys().cloned().collect(),
        });
    }

    let record = TemporalRecord {
        record_id,
        entity_key: row.entity_key,
        attributes: row.attributes,
        valid: Interval::new(
            valid_from,
            UpperBound::from_source(row.valid_to, schema.infinity_sentinel),
        ),
        transaction: Interval::new(
            tran_from,
            UpperBound::from_source(row.tran_to, schema.infinity_sentinel),
        ),
    };
    record.check_intervals()?;
    Ok(record)
}

/// Per entity: no two versions share a bitemporal region, transaction coverage is
/// contiguous, and coverage reaches the present. Returns the number of entities.
fn check_entity_histories(records: &[TemporalRecord]) -> Result<usize, MalformedRecordError> {
    let mut by_entity: BTreeMap<&EntityKey, Vec<&TemporalRecord>> = BTreeMap::new();
    for record in records {
        by_entity.entry(&record.entity_key).or_default().push(record);
    }

    for (entity_key, versions) in &by_entity {
        for (index, first) in versions.iter().enumerate() {
            if let Some(second) = versions[index + 1..].iter().find(|other| first.overlaps(other)) {
                return Err(MalformedRecordError::OverlappingCoverage {
                    entity_key: (*entity_key).clone(),
                    first: first.record_id,
                    second: second.record_id,
                });
            }
        }

        let mut spans = versions.iter().map(|record| record.transaction).collect::<Vec<_>>();
        spans.sort_by_key(|span| span.from);
        let Some((head, tail)) = spans.split_first() else {
            continue;
        };

        let mut covered = head.to;
        for span in tail {
            if let UpperBound::Closed(closed_at) = covered {
                if span.from > closed_at {
                    return Err(MalformedRecordError::TransactionGap {
                        entity_key: (*entity_key).clone(),
                        closed_at,
                        resumes_at: span.from,
                    });
                }
            }
            covered = covered.max(span.to);
        }

        if !covered.is_open() {
            return Err(MalformedRecordError::NoCurrentVersion {
                entity_key: (*entity_key).clone(),
            });
        }
    }

    Ok(by_entity.len())
}

fn fingerprint(schema: &DatasetSchema, records: &[TemporalRecord]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(schema).unwrap_or_default());
    for record in records {
        hasher.update(serde_json::to_vec(record).unwrap_or_default());
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
