use std::fmt::{Display, Formatter};

use anyhow::{anyhow, Context, Result};
use bitemporal_kernel_core::instant::serde_instant;
use bitemporal_kernel_core::{format_instant, Instant, Interval, UpperBound};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::macros::datetime;

use crate::tables::{HistoryTable, INFINITY_SENTINEL};
use crate::{json_value, parse_bound, parse_lower_bound};

/// The complete set of writes the store accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationCommand {
    /// Wipe both tables and restore the demo history.
    Reset,
    /// Sequenced bitemporal update: from `valid_from` onwards the entity takes
    /// the changed attribute values, recorded at the mutation's transaction instant.
    Amend {
        table: HistoryTable,
        entity_id: i64,
        changes: Map<String, Value>,
        #[serde(with = "serde_instant")]
        valid_from: Instant,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutationOutcome {
    pub table: Option<HistoryTable>,
    pub entity_id: Option<i64>,
    #[serde(with = "serde_instant")]
    pub recorded_at: Instant,
    pub closed_versions: usize,
    pub inserted_versions: usize,
}

/// Canned mutations, one per demo button.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PresetCommand {
    Reset,
    RenameDepartment,
    RestoreDepartment,
    PromoteEmployee,
}

impl PresetCommand {
    pub const ALL: [Self; 4] =
        [Self::Reset, Self::RenameDepartment, Self::RestoreDepartment, Self::PromoteEmployee];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::RenameDepartment => "rename-department",
            Self::RestoreDepartment => "restore-department",
            Self::PromoteEmployee => "promote-employee",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.as_str() == raw)
    }

    /// Button caption.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Reset => "Reset",
            Self::RenameDepartment => "Update #1",
            Self::RestoreDepartment => "Update #2",
            Self::PromoteEmployee => "Update #3",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Reset => "Reset the database data and refresh the charts and tables",
            Self::RenameDepartment => {
                "Rename department 10 to 'New Sales' with effect from 2025-10-01"
            }
            Self::RestoreDepartment => {
                "Rename department 10 to 'Original Sales' with effect from 2020-06-01"
            }
            Self::PromoteEmployee => {
                "Change employee 100's job title to 'Lead Sales Rep' with effect from 2025-10-01"
            }
        }
    }

    #[must_use]
    pub fn command(self) -> MutationCommand {
        match self {
            Self::Reset => MutationCommand::Reset,
            Self::RenameDepartment => amend_one(
                HistoryTable::Department,
                10,
                "dept_name",
                "New Sales",
                datetime!(2025-10-01 0:00),
            ),
            Self::RestoreDepartment => amend_one(
                HistoryTable::Department,
                10,
                "dept_name",
                "Original Sales",
                datetime!(2020-06-01 0:00),
            ),
            Self::PromoteEmployee => amend_one(
                HistoryTable::Employee,
                100,
                "job_title",
                "Lead Sales Rep",
                datetime!(2025-10-01 0:00),
            ),
        }
    }
}

impl Display for PresetCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn amend_one(
    table: HistoryTable,
    entity_id: i64,
    column: &str,
    value: &str,
    valid_from: Instant,
) -> MutationCommand {
    let mut changes = Map::new();
    changes.insert(column.to_string(), json!(value));
    MutationCommand::Amend { table, entity_id, changes, valid_from }
}

struct CurrentVersion {
    hist_id: i64,
    attributes: Map<String, Value>,
    valid: Interval,
    tran_from: Instant,
}

/// Close the entity's current versions at `at` and re-record them, applying
/// `changes` to the valid time at or after `valid_from`.
pub(crate) fn amend(
    tx: &Transaction<'_>,
    table: HistoryTable,
    entity_id: i64,
    changes: &Map<String, Value>,
    valid_from: Instant,
    at: Instant,
) -> Result<MutationOutcome> {
    if changes.is_empty() {
        return Err(anyhow!("amend of {table} {entity_id} has no changes"));
    }
    let attribute_columns = table.attribute_columns();
    if let Some(column) = changes.keys().find(|column| !attribute_columns.contains(&column.as_str()))
    {
        return Err(anyhow!(
            "column `{column}` cannot be amended on {table}; expected one of {attribute_columns:?}"
        ));
    }

    let current = current_versions(tx, table, entity_id)?;
    if current.is_empty() {
        return Err(anyhow!("{table} {entity_id} has no current version"));
    }
    if let Some(version) = current.iter().find(|version| at <= version.tran_from) {
        return Err(anyhow!(
            "transaction instant {} must be later than {} (tran_from of {} {})",
            format_instant(at),
            format_instant(version.tran_from),
            table.id_column(),
            version.hist_id
        ));
    }

    let closed_versions = tx
        .execute(
            &format!(
                "UPDATE {table} SET tran_to = ?1 WHERE {key} = ?2 AND tran_to = ?3",
                table = table.table_name(),
                key = table.key_column()
            ),
            params![format_instant(at), entity_id, INFINITY_SENTINEL],
        )
        .with_context(|| format!("failed to close current versions of {table} {entity_id}"))?;

    let recorded = Interval::open(at);
    let mut inserted_versions = 0;
    for version in current {
        if version.valid.from < valid_from {
            let end = match version.valid.to {
                UpperBound::Closed(end) => end.min(valid_from),
                UpperBound::Open => valid_from,
            };
            insert_version(
                tx,
                table,
                entity_id,
                &version.attributes,
                Interval::closed(version.valid.from, end),
                recorded,
            )?;
            inserted_versions += 1;
        }

        if version.valid.to.is_after(valid_from) {
            let mut attributes = version.attributes;
            for (column, value) in changes {
                attributes.insert(column.clone(), value.clone());
            }
            insert_version(
                tx,
                table,
                entity_id,
                &attributes,
                Interval::new(version.valid.from.max(valid_from), version.valid.to),
                recorded,
            )?;
            inserted_versions += 1;
        }
    }

    tracing::debug!(
        table = %table,
        entity_id,
        valid_from = %format_instant(valid_from),
        at = %format_instant(at),
        closed_versions,
        inserted_versions,
        "amended entity history"
    );

    Ok(MutationOutcome {
        table: Some(table),
        entity_id: Some(entity_id),
        recorded_at: at,
        closed_versions,
        inserted_versions,
    })
}

fn current_versions(
    tx: &Transaction<'_>,
    table: HistoryTable,
    entity_id: i64,
) -> Result<Vec<CurrentVersion>> {
    let attribute_columns = table.attribute_columns();
    let sql = format!(
        "SELECT {id}, {attributes}, valid_from, valid_to, tran_from
         FROM {table}
         WHERE {key} = ?1 AND tran_to = ?2
         ORDER BY {id} ASC",
        id = table.id_column(),
        attributes = attribute_columns.join(", "),
        table = table.table_name(),
        key = table.key_column(),
    );
    let mut stmt = tx.prepare(&sql).with_context(|| format!("failed to prepare {table} lookup"))?;
    let mut rows = stmt.query(params![entity_id, INFINITY_SENTINEL])?;

    let bounds_at = attribute_columns.len() + 1;
    let mut versions = Vec::new();
    while let Some(row) = rows.next()? {
        let mut attributes = Map::new();
        for (offset, column) in attribute_columns.iter().enumerate() {
            attributes.insert((*column).to_string(), json_value(row.get_ref(offset + 1)?)?);
        }
        let valid_from = parse_lower_bound(row.get::<_, Option<String>>(bounds_at)?, "valid_from")?;
        let valid_to = parse_bound(row.get::<_, Option<String>>(bounds_at + 1)?)?;
        let tran_from =
            parse_lower_bound(row.get::<_, Option<String>>(bounds_at + 2)?, "tran_from")?;
        versions.push(CurrentVersion {
            hist_id: row.get(0)?,
            attributes,
            valid: Interval::new(valid_from, valid_to),
            tran_from,
        });
    }
    Ok(versions)
}

/// Insert one version; the history id is assigned by `SQLite`.
pub(crate) fn insert_version(
    tx: &Transaction<'_>,
    table: HistoryTable,
    entity_id: i64,
    attributes: &Map<String, Value>,
    valid: Interval,
    transaction: Interval,
) -> Result<()> {
    let attribute_columns = table.attribute_columns();
    let mut values = Vec::with_capacity(attribute_columns.len() + 5);
    values.push(SqlValue::Integer(entity_id));
    for column in attribute_columns {
        values.push(sql_value(attributes.get(*column).unwrap_or(&Value::Null))?);
    }
    values.push(SqlValue::Text(format_instant(valid.from)));
    values.push(SqlValue::Text(bound_text(valid.to)));
    values.push(SqlValue::Text(format_instant(transaction.from)));
    values.push(SqlValue::Text(bound_text(transaction.to)));

    let placeholders = (1..=values.len()).map(|index| format!("?{index}")).collect::<Vec<_>>();
    let sql = format!(
        "INSERT INTO {table}({key}, {attributes}, valid_from, valid_to, tran_from, tran_to)
         VALUES ({placeholders})",
        table = table.table_name(),
        key = table.key_column(),
        attributes = attribute_columns.join(", "),
        placeholders = placeholders.join(", "),
    );
    tx.execute(&sql, params_from_iter(values.iter()))
        .with_context(|| format!("failed to insert {table} version for {entity_id}"))?;
    Ok(())
}

fn bound_text(bound: UpperBound) -> String {
    bound.closed().map_or_else(|| INFINITY_SENTINEL.to_string(), format_instant)
}

fn sql_value(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => number
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| number.as_f64().map(SqlValue::Real))
            .ok_or_else(|| anyhow!("attribute number {number} does not fit SQLite")),
        Value::String(text) => Ok(SqlValue::Text(text.clone())),
        other => Err(anyhow!("attribute value {other} is not a scalar")),
    }
}
