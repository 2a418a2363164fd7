use std::fmt::{Display, Formatter};

use anyhow::{Context, Result};
use bitemporal_kernel_core::{parse_instant, DatasetSchema, Instant};
use serde::{Deserialize, Serialize};

/// Stored in place of an open upper bound.
pub const INFINITY_SENTINEL: &str = "9999-12-31 00:00:00";

/// The history tables this store knows how to read and amend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HistoryTable {
    Department,
    Employee,
}

impl HistoryTable {
    pub const ALL: [Self; 2] = [Self::Department, Self::Employee];

    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Department => "department",
            Self::Employee => "employee",
        }
    }

    /// Name the dataset is installed under.
    #[must_use]
    pub fn dataset_name(self) -> &'static str {
        match self {
            Self::Department => "Department",
            Self::Employee => "Employee",
        }
    }

    #[must_use]
    pub fn id_column(self) -> &'static str {
        match self {
            Self::Department => "dept_hist_id",
            Self::Employee => "emp_hist_id",
        }
    }

    #[must_use]
    pub fn key_column(self) -> &'static str {
        match self {
            Self::Department => "dept_id",
            Self::Employee => "emp_id",
        }
    }

    #[must_use]
    pub fn attribute_columns(self) -> &'static [&'static str] {
        match self {
            Self::Department => &["dept_name", "location"],
            Self::Employee => {
                &["dept_id", "first_name", "last_name", "job_title", "hire_date", "term_date"]
            }
        }
    }

    #[must_use]
    pub fn label_columns(self) -> &'static [&'static str] {
        match self {
            Self::Department => &["dept_hist_id", "dept_name"],
            Self::Employee => &["emp_hist_id", "last_name", "job_title"],
        }
    }

    /// Accepts the table name or the dataset name, case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| {
            raw.eq_ignore_ascii_case(table.table_name())
                || raw.eq_ignore_ascii_case(table.dataset_name())
        })
    }

    /// Kernel schema for this table, with the store's infinity sentinel.
    ///
    /// # Errors
    /// Returns an error when the static column layout fails schema validation.
    pub fn schema(self) -> Result<DatasetSchema> {
        let schema = DatasetSchema::new(
            self.dataset_name(),
            self.id_column(),
            self.key_column(),
            self.attribute_columns(),
            self.label_columns(),
        )
        .with_context(|| format!("invalid schema for table {}", self.table_name()))?;
        Ok(schema.with_infinity_sentinel(infinity_sentinel()?))
    }
}

impl Display for HistoryTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

pub(crate) fn infinity_sentinel() -> Result<Instant> {
    parse_instant(INFINITY_SENTINEL).context("failed to parse infinity sentinel")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_table_and_dataset_names() {
        assert_eq!(HistoryTable::parse("department"), Some(HistoryTable::Department));
        assert_eq!(HistoryTable::parse("Employee"), Some(HistoryTable::Employee));
        assert_eq!(HistoryTable::parse("EMPLOYEE"), Some(HistoryTable::Employee));
        assert_eq!(HistoryTable::parse("payroll"), None);
    }

    #[test]
    fn schemas_match_table_layouts() -> Result<()> {
        let department = HistoryTable::Department.schema()?;
        assert_eq!(
            department.columns(),
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
        assert_eq!(department.infinity_sentinel, Some(infinity_sentinel()?));

        let employee = HistoryTable::Employee.schema()?;
        assert_eq!(employee.columns().len(), 12);
        assert_eq!(employee.label_columns, vec!["emp_hist_id", "last_name", "job_title"]);
        Ok(())
    }
}
