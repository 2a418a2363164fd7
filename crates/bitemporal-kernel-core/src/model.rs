use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::instant::{format_instant, serde_instant, serde_instant_option, Instant};
use crate::KernelError;

/// Surrogate identifier of one stored version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Natural key shared by every version of one logical entity.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct EntityKey(pub String);

impl EntityKey {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Valid,
    Transaction,
}

impl Axis {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Transaction => "transaction",
        }
    }
}

impl Display for Axis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exclusive upper bound of an interval. `Open` means "still in effect".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UpperBound {
    Closed(#[serde(with = "serde_instant")] Instant),
    Open,
}

impl UpperBound {
    /// Normalize a source value: null and the infinity sentinel both become `Open`.
    #[must_use]
    pub fn from_source(value: Option<Instant>, infinity_sentinel: Option<Instant>) -> Self {
        match value {
            Some(instant) if Some(instant) == infinity_sentinel => Self::Open,
            Some(instant) => Self::Closed(instant),
            None => Self::Open,
        }
    }

    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// True when `instant` lies strictly before this bound.
    #[must_use]
    pub fn is_after(self, instant: Instant) -> bool {
        match self {
            Self::Closed(end) => instant < end,
            Self::Open => true,
        }
    }

    #[must_use]
    pub fn closed(self) -> Option<Instant> {
        match self {
            Self::Closed(end) => Some(end),
            Self::Open => None,
        }
    }

    /// Substitute `horizon` for an open bound.
    #[must_use]
    pub fn resolve(self, horizon: Instant) -> Instant {
        self.closed().unwrap_or(horizon)
    }

    /// The later of two bounds; `Open` dominates.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        match (self, other) {
            (Self::Closed(lhs), Self::Closed(rhs)) => Self::Closed(lhs.max(rhs)),
            _ => Self::Open,
        }
    }
}

impl Display for UpperBound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed(end) => f.write_str(&format_instant(*end)),
            Self::Open => f.write_str("open"),
        }
    }
}

/// Closed-open interval `[from, to)` on one time axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct Interval {
    #[serde(with = "serde_instant")]
    pub from: Instant,
    pub to: UpperBound,
}

impl Interval {
    #[must_use]
    pub fn new(from: Instant, to: UpperBound) -> Self {
        Self { from, to }
    }

    #[must_use]
    pub fn open(from: Instant) -> Self {
        Self { from, to: UpperBound::Open }
    }

    #[must_use]
    pub fn closed(from: Instant, to: Instant) -> Self {
        Self { from, to: UpperBound::Closed(to) }
    }

    /// Lower bound inclusive, upper bound exclusive.
    #[must_use]
    pub fn contains(&self, instant: Instant) -> bool {
        self.from <= instant && self.to.is_after(instant)
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        other.to.is_after(self.from) && self.to.is_after(other.from)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.to, UpperBound::Closed(end) if end <= self.from)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Current,
    Historical,
}

impl RecordStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "Current",
            Self::Historical => "Historical",
        }
    }
}

/// One version of one entity, positioned on both time axes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalRecord {
    pub record_id: RecordId,
    pub entity_key: EntityKey,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub valid: Interval,
    pub transaction: Interval,
}

impl TemporalRecord {
    /// Build a record from already-normalized intervals.
    ///
    /// # Errors
    /// Returns [`crate::MalformedRecordError::EmptyInterval`] (wrapped as
    /// [`KernelError::Malformed`] with an empty dataset name) when either interval
    /// is zero-width or inverted.
    pub fn new(
        record_id: RecordId,
        entity_key: EntityKey,
        attributes: Map<String, Value>,
        valid: Interval,
        transaction: Interval,
    ) -> Result<Self, KernelError> {
        let record = Self { record_id, entity_key, attributes, valid, transaction };
        record.check_intervals().map_err(|source| KernelError::Malformed {
            dataset: String::new(),
            source,
        })?;
        Ok(record)
    }

    pub(crate) fn check_intervals(&self) -> Result<(), crate::MalformedRecordError> {
        for (axis, interval) in [(Axis::Valid, &self.valid), (Axis::Transaction, &self.transaction)]
        {
            if interval.is_empty() {
                return Err(crate::MalformedRecordError::EmptyInterval {
                    record_id: self.record_id,
                    axis,
                    from: interval.from,
                    to: interval.to,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn status(&self) -> RecordStatus {
        if self.transaction.to.is_open() {
            RecordStatus::Current
        } else {
            RecordStatus::Historical
        }
    }

    /// Whether this version was in force at `(transaction, valid)`.
    #[must_use]
    pub fn is_in_force(&self, transaction: Instant, valid: Instant) -> bool {
        self.transaction.contains(transaction) && self.valid.contains(valid)
    }

    /// Both rectangles share a region of the bitemporal plane.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.transaction.overlaps(&other.transaction) && self.valid.overlaps(&other.valid)
    }
}

/// A row exactly as the data source hands it over.
///
/// Upper bounds are `None` when the source reports them open; lower bounds are
/// mandatory and a `None` there is an error, never "open".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalRow {
    pub record_id: RecordId,
    pub entity_key: EntityKey,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(with = "serde_instant_option")]
    pub valid_from: Option<Instant>,
    #[serde(with = "serde_instant_option")]
    pub valid_to: Option<Instant>,
    #[serde(with = "serde_instant_option")]
    pub tran_from: Option<Instant>,
    #[serde(with = "serde_instant_option")]
    pub tran_to: Option<Instant>,
}

pub const VALID_FROM_COLUMN: &str = "valid_from";
pub const VALID_TO_COLUMN: &str = "valid_to";
pub const TRAN_FROM_COLUMN: &str = "tran_from";
pub const TRAN_TO_COLUMN: &str = "tran_to";

/// Column layout of one entity type's history table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetSchema {
    pub name: String,
    pub id_column: String,
    pub key_column: String,
    pub attribute_columns: Vec<String>,
    pub label_columns: Vec<String>,
    #[serde(default, with = "serde_instant_option")]
    pub infinity_sentinel: Option<Instant>,
}

impl DatasetSchema {
    /// Describe a schema and check it for internal consistency.
    ///
    /// # Errors
    /// Returns [`KernelError::Schema`] when the name or a column is blank, a column
    /// name repeats, or a label column is not part of the schema.
    pub fn new(
        name: impl Into<String>,
        id_column: impl Into<String>,
        key_column: impl Into<String>,
        attribute_columns: &[&str],
        label_columns: &[&str],
    ) -> Result<Self, KernelError> {
        let schema = Self {
            name: name.into(),
            id_column: id_column.into(),
            key_column: key_column.into(),
            attribute_columns: attribute_columns.iter().map(ToString::to_string).collect(),
            label_columns: label_columns.iter().map(ToString::to_string).collect(),
            infinity_sentinel: None,
        };
        schema.validate()?;
        Ok(schema)
    }

    #[must_use]
    pub fn with_infinity_sentinel(mut self, sentinel: Instant) -> Self {
        self.infinity_sentinel = Some(sentinel);
        self
    }

    /// # Errors
    /// See [`DatasetSchema::new`].
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.name.trim().is_empty() {
            return Err(KernelError::Schema("dataset name MUST be non-empty".to_string()));
        }

        let mut seen = BTreeSet::new();
        for column in self.columns() {
            if column.trim().is_empty() {
                return Err(KernelError::Schema(format!(
                    "dataset `{}` has a blank column name",
                    self.name
                )));
            }
            if !seen.insert(column) {
                return Err(KernelError::Schema(format!(
                    "dataset `{}` repeats column `{column}`",
                    self.name
                )));
            }
        }

        for label in &self.label_columns {
            let known = *label == self.id_column
                || *label == self.key_column
                || self.attribute_columns.contains(label);
            if !known {
                return Err(KernelError::Schema(format!(
                    "dataset `{}` label column `{label}` is not an id, key, or attribute column",
                    self.name
                )));
            }
        }

        Ok(())
    }

    /// Every column in table order: id, key, attributes, then the four bounds.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = Vec::with_capacity(self.attribute_columns.len() + 6);
        columns.push(self.id_column.as_str());
        columns.push(self.key_column.as_str());
        columns.extend(self.attribute_columns.iter().map(String::as_str));
        columns.extend([VALID_FROM_COLUMN, VALID_TO_COLUMN, TRAN_FROM_COLUMN, TRAN_TO_COLUMN]);
        columns
    }
}

/// Display form of an attribute value: strings unquoted, null as `-`.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn interval_is_closed_open() {
        let interval = Interval::closed(datetime!(2020-06-01 0:00), datetime!(2025-10-01 0:00));
        assert!(interval.contains(datetime!(2020-06-01 0:00)));
        assert!(interval.contains(datetime!(2025-09-30 23:59:59)));
        assert!(!interval.contains(datetime!(2025-10-01 0:00)));
        assert!(!interval.contains(datetime!(2020-05-31 23:59:59)));
    }

    #[test]
    fn open_interval_reaches_far_future() {
        let interval = Interval::open(datetime!(2024-01-01 0:00));
        assert!(interval.contains(datetime!(9999-12-31 23:59:59)));
        assert!(!interval.contains(datetime!(2023-12-31 23:59:59)));
    }

    #[test]
    fn adjacent_intervals_do_not_overlap() {
        let first = Interval::closed(datetime!(2020-01-01 0:00), datetime!(2021-01-01 0:00));
        let second = Interval::open(datetime!(2021-01-01 0:00));
        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));

        let straddling = Interval::closed(datetime!(2020-12-31 0:00), datetime!(2021-01-02 0:00));
        assert!(first.overlaps(&straddling));
        assert!(second.overlaps(&straddling));
    }

    #[test]
    fn sentinel_and_null_both_normalize_to_open() {
        let sentinel = datetime!(9999-12-31 0:00);
        assert_eq!(UpperBound::from_source(None, Some(sentinel)), UpperBound::Open);
        assert_eq!(UpperBound::from_source(Some(sentinel), Some(sentinel)), UpperBound::Open);
        assert_eq!(
            UpperBound::from_source(Some(datetime!(2025-01-01 0:00)), Some(sentinel)),
            UpperBound::Closed(datetime!(2025-01-01 0:00))
        );
    }

    #[test]
    fn record_rejects_zero_width_interval() {
        let result = TemporalRecord::new(
            RecordId(1),
            EntityKey::new("10"),
            Map::new(),
            Interval::closed(datetime!(2024-01-01 0:00), datetime!(2024-01-01 0:00)),
            Interval::open(datetime!(2024-01-01 0:00)),
        );
        assert!(matches!(
            result,
            Err(KernelError::Malformed {
                source: crate::MalformedRecordError::EmptyInterval { axis: Axis::Valid, .. },
                ..
            })
        ));
    }

    #[test]
    fn schema_rejects_unknown_label_and_duplicate_columns() {
        let unknown = DatasetSchema::new("dept", "dept_hist_id", "dept_id", &["dept_name"], &["x"]);
        assert!(matches!(unknown, Err(KernelError::Schema(message)) if message.contains("`x`")));

        let duplicate =
            DatasetSchema::new("dept", "dept_hist_id", "dept_id", &["valid_from"], &[]);
        assert!(
            matches!(duplicate, Err(KernelError::Schema(message)) if message.contains("repeats"))
        );
    }

    #[test]
    fn schema_columns_follow_table_order() -> Result<(), KernelError> {
        let schema = DatasetSchema::new(
            "Department",
            "dept_hist_id",
            "dept_id",
            &["dept_name", "location"],
            &["dept_hist_id", "dept_name"],
        )?;
        assert_eq!(
            schema.columns(),
            vec![
                "dept_hist_id",
                "dept_id",
                "dept_name",
                "location",
                "valid_from",
                "valid_to",
                "tran_from",
                "tran_to"
            ]
        );
        Ok(())
    }
}
