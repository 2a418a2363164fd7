//! `SQLite` persistence for department and employee histories.
//!
//! Bounds are stored as `YYYY-MM-DD HH:MM:SS` text; open upper bounds hold
//! [`INFINITY_SENTINEL`]. Reads hand rows to the kernel with the sentinel already
//! resolved to "open", and every write goes through [`MutationCommand`].

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use bitemporal_kernel_core::{
    format_instant, parse_instant, EntityKey, Instant, RecordId, TemporalDataset, TemporalRow,
    UpperBound,
};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, DatabaseName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

mod mutation;
mod seed;
mod tables;

pub use mutation::{MutationCommand, MutationOutcome, PresetCommand};
pub use tables::{HistoryTable, INFINITY_SENTINEL};

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS department (
  dept_hist_id INTEGER PRIMARY KEY AUTOINCREMENT,
  dept_id INTEGER NOT NULL,
  dept_name TEXT NOT NULL,
  location TEXT,
  valid_from TEXT NOT NULL,
  valid_to TEXT NOT NULL DEFAULT '9999-12-31 00:00:00',
  tran_from TEXT NOT NULL,
  tran_to TEXT NOT NULL DEFAULT '9999-12-31 00:00:00',
  CHECK (valid_from < valid_to),
  CHECK (tran_from < tran_to)
);

CREATE TABLE IF NOT EXISTS employee (
  emp_hist_id INTEGER PRIMARY KEY AUTOINCREMENT,
  emp_id INTEGER NOT NULL,
  dept_id INTEGER NOT NULL,
  first_name TEXT NOT NULL,
  last_name TEXT NOT NULL,
  job_title TEXT,
  hire_date TEXT,
  term_date TEXT,
  valid_from TEXT NOT NULL,
  valid_to TEXT NOT NULL DEFAULT '9999-12-31 00:00:00',
  tran_from TEXT NOT NULL,
  tran_to TEXT NOT NULL DEFAULT '9999-12-31 00:00:00',
  CHECK (valid_from < valid_to),
  CHECK (tran_from < tran_to)
);

CREATE INDEX IF NOT EXISTS idx_department_current ON department(dept_id, tran_to);
CREATE INDEX IF NOT EXISTS idx_employee_current ON employee(emp_id, tran_to);
CREATE INDEX IF NOT EXISTS idx_employee_dept ON employee(dept_id);
";

pub struct SqliteHistoryStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
    pub inferred_from_legacy: bool,
}

impl SqliteHistoryStore {
    /// Open a SQLite-backed history store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let (current_version, inferred_from_legacy) = detect_effective_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
            inferred_from_legacy,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;
        if version == 0 {
            if history_tables_exist(&self.conn)? {
                // Tables created before migrations were tracked.
                record_schema_version(&self.conn, 1)?;
            } else {
                let tx = self.conn.transaction().context("failed to start migration v1")?;
                tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
                record_schema_version(&tx, 1)?;
                tx.commit().context("failed to commit migration v1")?;
            }
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        tracing::debug!(version, "history store schema is current");
        Ok(())
    }

    /// Rows of `table` in history-id order, sentinel bounds resolved to `None`.
    ///
    /// With `department_id`, only entities that have ever belonged to that
    /// department are returned, each with its complete history.
    ///
    /// # Errors
    /// Returns an error when the query fails or a stored value cannot be decoded.
    pub fn fetch(&self, table: HistoryTable, department_id: Option<i64>) -> Result<Vec<TemporalRow>> {
        let attribute_columns = table.attribute_columns();
        let sql = format!(
            "SELECT
                {id}, {key}, {attributes}, valid_from,
                CASE WHEN valid_to = ?1 THEN NULL ELSE valid_to END AS valid_to,
                tran_from,
                CASE WHEN tran_to = ?1 THEN NULL ELSE tran_to END AS tran_to
             FROM {table}
             WHERE ?2 IS NULL OR {key} IN (SELECT {key} FROM {table} WHERE dept_id = ?2)
             ORDER BY {id} ASC",
            id = table.id_column(),
            key = table.key_column(),
            attributes = attribute_columns.join(", "),
            table = table.table_name(),
        );

        let mut stmt =
            self.conn.prepare(&sql).with_context(|| format!("failed to prepare {table} fetch"))?;
        let mut rows = stmt.query(params![INFINITY_SENTINEL, department_id])?;

        let bounds_at = attribute_columns.len() + 2;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let mut attributes = Map::new();
            for (offset, column) in attribute_columns.iter().enumerate() {
                attributes.insert((*column).to_string(), json_value(row.get_ref(offset + 2)?)?);
            }

            fetched.push(TemporalRow {
                record_id: RecordId(row.get(0)?),
                entity_key: entity_key(row.get_ref(1)?)?,
                attributes,
                valid_from: optional_instant(row.get(bounds_at)?)?,
                valid_to: optional_instant(row.get(bounds_at + 1)?)?,
                tran_from: optional_instant(row.get(bounds_at + 2)?)?,
                tran_to: optional_instant(row.get(bounds_at + 3)?)?,
            });
        }

        Ok(fetched)
    }

    /// Fetch and validate one table as a kernel dataset.
    ///
    /// # Errors
    /// Returns an error when the fetch fails or the stored history is malformed.
    pub fn load_dataset(
        &self,
        table: HistoryTable,
        department_id: Option<i64>,
    ) -> Result<TemporalDataset> {
        let rows = self.fetch(table, department_id)?;
        TemporalDataset::load(table.schema()?, rows)
            .with_context(|| format!("stored {table} history is malformed"))
    }

    /// Apply one mutation in a single transaction recorded at `at`.
    ///
    /// `at` is truncated to whole seconds, the precision bounds are stored with.
    ///
    /// # Errors
    /// Returns an error when the command is refused or any write fails; nothing is
    /// committed in that case.
    pub fn apply(&mut self, command: &MutationCommand, at: Instant) -> Result<MutationOutcome> {
        let at = whole_seconds(at)?;
        let tx = self.conn.transaction().context("failed to start mutation transaction")?;

        let outcome = match command {
            MutationCommand::Reset => reset(&tx, at)?,
            MutationCommand::Amend { table, entity_id, changes, valid_from } => {
                mutation::amend(&tx, *table, *entity_id, changes, whole_seconds(*valid_from)?, at)?
            }
        };

        tx.commit().context("failed to commit mutation transaction")?;
        Ok(outcome)
    }

    /// Restore the demo history when both tables are empty. Returns whether it did.
    ///
    /// # Errors
    /// Returns an error when the tables cannot be counted or seeding fails.
    pub fn seed_if_empty(&mut self) -> Result<bool> {
        let existing = HistoryTable::ALL
            .into_iter()
            .map(|table| self.version_count(table))
            .sum::<Result<usize>>()?;
        if existing > 0 {
            return Ok(false);
        }
        self.apply(&MutationCommand::Reset, now_naive())?;
        Ok(true)
    }

    /// Number of stored versions in `table`, current and historical.
    ///
    /// # Errors
    /// Returns an error when the count query fails.
    pub fn version_count(&self, table: HistoryTable) -> Result<usize> {
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.table_name()), [], |row| {
                row.get::<_, i64>(0)
            })
            .with_context(|| format!("failed to count {table} versions"))?;
        usize::try_from(count).context("negative row count")
    }

    /// Create a `SQLite` backup file of the current main database.
    ///
    /// # Errors
    /// Returns an error when backup directories cannot be created or backup fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for backup file {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to create sqlite backup at {}", out_file.display()))
    }
}

fn reset(tx: &rusqlite::Transaction<'_>, at: Instant) -> Result<MutationOutcome> {
    tx.execute_batch(
        "DELETE FROM employee;
         DELETE FROM department;
         DELETE FROM sqlite_sequence WHERE name IN ('department', 'employee');",
    )
    .context("failed to clear history tables")?;

    let versions = seed::demo_history();
    for version in &versions {
        mutation::insert_version(
            tx,
            version.table,
            version.entity_id,
            &version.attributes,
            version.valid,
            version.transaction,
        )?;
    }

    tracing::debug!(versions = versions.len(), "restored demo history");
    Ok(MutationOutcome {
        table: None,
        entity_id: None,
        recorded_at: at,
        closed_versions: 0,
        inserted_versions: versions.len(),
    })
}

/// Current wall-clock time as a naive UTC instant.
#[must_use]
pub fn now_naive() -> Instant {
    let now = OffsetDateTime::now_utc();
    Instant::new(now.date(), now.time())
}

fn whole_seconds(instant: Instant) -> Result<Instant> {
    instant.replace_nanosecond(0).context("failed to truncate instant to whole seconds")
}

pub(crate) fn json_value(value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(number) => Ok(Value::from(number)),
        ValueRef::Real(number) => {
            Ok(serde_json::Number::from_f64(number).map_or(Value::Null, Value::Number))
        }
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|text| Value::String(text.to_string()))
            .context("stored text is not valid UTF-8"),
        ValueRef::Blob(_) => Err(anyhow!("blob attributes are not supported")),
    }
}

fn entity_key(value: ValueRef<'_>) -> Result<EntityKey> {
    match value {
        ValueRef::Integer(number) => Ok(EntityKey::new(number.to_string())),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(EntityKey::new)
            .context("stored entity key is not valid UTF-8"),
        other => Err(anyhow!("unsupported entity key type {:?}", other.data_type())),
    }
}

fn optional_instant(raw: Option<String>) -> Result<Option<Instant>> {
    raw.map(|text| parse_instant(&text).with_context(|| format!("invalid stored instant `{text}`")))
        .transpose()
}

pub(crate) fn parse_lower_bound(raw: Option<String>, column: &str) -> Result<Instant> {
    optional_instant(raw)?.ok_or_else(|| anyhow!("stored version has no {column}"))
}

/// Sentinel and null both mean "open".
pub(crate) fn parse_bound(raw: Option<String>) -> Result<UpperBound> {
    match raw {
        Some(text) if text == INFINITY_SENTINEL => Ok(UpperBound::Open),
        other => Ok(optional_instant(other)?.map_or(UpperBound::Open, UpperBound::Closed)),
    }
}

fn history_tables_exist(conn: &Connection) -> Result<bool> {
    for table in HistoryTable::ALL {
        if !table_exists(conn, table.table_name())? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn detect_effective_schema_version(conn: &Connection) -> Result<(i64, bool)> {
    let recorded = current_schema_version(conn)?;
    if recorded > 0 {
        return Ok((recorded, false));
    }

    if history_tables_exist(conn)? {
        return Ok((1, true));
    }

    Ok((0, false))
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, format_instant(now_naive())],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use bitemporal_kernel_core::{match_dataset, RecordStatus, TemporalPoint};
    use proptest::prelude::*;
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn seeded_store() -> Result<SqliteHistoryStore> {
        let mut store = SqliteHistoryStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        assert!(store.seed_if_empty()?);
        Ok(store)
    }

    fn ids(values: &[i64]) -> BTreeSet<RecordId> {
        values.iter().copied().map(RecordId).collect()
    }

    #[test]
    fn migrate_is_idempotent_and_reports_status() -> Result<()> {
        let mut store = SqliteHistoryStore::open(Path::new(":memory:"))?;
        let before = store.schema_status()?;
        assert_eq!(before.current_version, 0);
        assert_eq!(before.pending_versions, vec![1]);

        store.migrate()?;
        store.migrate()?;
        let after = store.schema_status()?;
        assert_eq!(after.current_version, LATEST_SCHEMA_VERSION);
        assert!(after.pending_versions.is_empty());
        assert!(!after.inferred_from_legacy);
        Ok(())
    }

    #[test]
    fn untracked_tables_are_adopted_as_version_one() -> Result<()> {
        let mut store = SqliteHistoryStore::open(Path::new(":memory:"))?;
        store.conn.execute_batch(MIGRATION_001_SQL)?;

        let status = store.schema_status()?;
        assert_eq!(status.current_version, 1);
        assert!(status.inferred_from_legacy);

        store.migrate()?;
        assert!(!store.schema_status()?.inferred_from_legacy);
        Ok(())
    }

    #[test]
    fn check_constraints_reject_empty_intervals() -> Result<()> {
        let store = seeded_store()?;
        let result = store.conn.execute(
            "INSERT INTO department(dept_id, dept_name, valid_from, valid_to, tran_from)
             VALUES (30, 'Empty', '2024-01-01 00:00:00', '2024-01-01 00:00:00', '2024-01-01 00:00:00')",
            [],
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn fetch_resolves_sentinel_and_orders_by_history_id() -> Result<()> {
        let store = seeded_store()?;
        let rows = store.fetch(HistoryTable::Department, None)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record_id, RecordId(1));
        assert_eq!(rows[0].entity_key, EntityKey::new("10"));
        assert_eq!(rows[0].attributes.get("dept_name"), Some(&json!("Sales")));
        assert_eq!(rows[0].valid_from, Some(datetime!(2020-06-01 0:00)));
        assert_eq!(rows[0].valid_to, None);
        assert_eq!(rows[0].tran_to, None);
        Ok(())
    }

    #[test]
    fn department_filter_keeps_whole_entity_histories() -> Result<()> {
        let store = seeded_store()?;
        let employees = store.fetch(HistoryTable::Employee, Some(10))?;
        let keys = employees.iter().map(|row| row.entity_key.as_str()).collect::<BTreeSet<_>>();
        assert_eq!(keys, BTreeSet::from(["100", "101"]));
        assert_eq!(employees.len(), 4);

        let departments = store.fetch(HistoryTable::Department, Some(10))?;
        assert_eq!(departments.len(), 1);
        Ok(())
    }

    #[test]
    fn seeded_history_loads_as_valid_datasets() -> Result<()> {
        let store = seeded_store()?;
        for table in HistoryTable::ALL {
            let dataset = store.load_dataset(table, None)?;
            assert_eq!(dataset.name(), table.dataset_name());
        }

        let employees = store.load_dataset(HistoryTable::Employee, Some(10))?;
        let statuses =
            employees.records().iter().map(|record| record.status()).collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                RecordStatus::Current,
                RecordStatus::Historical,
                RecordStatus::Current,
                RecordStatus::Current
            ]
        );

        let before_correction =
            TemporalPoint::new(datetime!(2024-08-01 0:00), datetime!(2024-08-01 0:00));
        assert_eq!(match_dataset(&employees, before_correction), ids(&[1, 2]));
        let after_correction =
            TemporalPoint::new(datetime!(2024-10-01 0:00), datetime!(2024-08-01 0:00));
        assert_eq!(match_dataset(&employees, after_correction), ids(&[1, 4]));
        Ok(())
    }

    #[test]
    fn rename_department_splits_valid_time_at_effective_date() -> Result<()> {
        let mut store = seeded_store()?;
        let at = datetime!(2025-01-01 0:00);
        let outcome = store.apply(&PresetCommand::RenameDepartment.command(), at)?;
        assert_eq!(outcome.closed_versions, 1);
        assert_eq!(outcome.inserted_versions, 2);

        let dataset = store.load_dataset(HistoryTable::Department, Some(10))?;
        assert_eq!(dataset.len(), 3);

        let old_view = TemporalPoint::new(datetime!(2024-06-01 0:00), datetime!(2026-01-01 0:00));
        assert_eq!(match_dataset(&dataset, old_view), ids(&[1]));
        let retained = TemporalPoint::new(datetime!(2025-06-01 0:00), datetime!(2021-01-01 0:00));
        assert_eq!(match_dataset(&dataset, retained), ids(&[3]));
        let renamed = TemporalPoint::new(datetime!(2025-06-01 0:00), datetime!(2026-01-01 0:00));
        assert_eq!(match_dataset(&dataset, renamed), ids(&[4]));

        let renamed_record = dataset.get(RecordId(4)).map(|record| record.attributes.clone());
        assert_eq!(
            renamed_record.and_then(|attributes| attributes.get("dept_name").cloned()),
            Some(json!("New Sales"))
        );
        Ok(())
    }

    #[test]
    fn preset_sequence_keeps_histories_well_formed() -> Result<()> {
        let mut store = seeded_store()?;
        store.apply(&PresetCommand::RenameDepartment.command(), datetime!(2025-01-01 0:00))?;
        store.apply(&PresetCommand::RestoreDepartment.command(), datetime!(2025-02-01 0:00))?;
        store.apply(&PresetCommand::PromoteEmployee.command(), datetime!(2025-03-01 0:00))?;

        let departments = store.load_dataset(HistoryTable::Department, Some(10))?;
        let now = TemporalPoint::new(datetime!(2025-06-01 0:00), datetime!(2026-01-01 0:00));
        let current = match_dataset(&departments, now);
        assert_eq!(current.len(), 1);
        let name = current
            .iter()
            .find_map(|id| departments.get(*id))
            .and_then(|record| record.attributes.get("dept_name").cloned());
        assert_eq!(name, Some(json!("Original Sales")));

        let employees = store.load_dataset(HistoryTable::Employee, Some(10))?;
        assert!(!employees.is_empty());
        Ok(())
    }

    #[test]
    fn amend_refuses_stale_transaction_instant_and_unknown_columns() -> Result<()> {
        let mut store = seeded_store()?;
        let stale = store.apply(&PresetCommand::RenameDepartment.command(), datetime!(2024-01-01 0:00));
        assert!(stale.is_err());

        let mut changes = Map::new();
        changes.insert("dept_id".to_string(), json!(99));
        let key_change = MutationCommand::Amend {
            table: HistoryTable::Department,
            entity_id: 10,
            changes,
            valid_from: datetime!(2025-01-01 0:00),
        };
        assert!(store.apply(&key_change, datetime!(2025-01-01 0:00)).is_err());

        let missing = MutationCommand::Amend {
            table: HistoryTable::Department,
            entity_id: 99,
            changes: Map::from_iter([("dept_name".to_string(), json!("Ghost"))]),
            valid_from: datetime!(2025-01-01 0:00),
        };
        assert!(store.apply(&missing, datetime!(2025-01-01 0:00)).is_err());

        assert_eq!(store.version_count(HistoryTable::Department)?, 2);
        Ok(())
    }

    #[test]
    fn reset_restores_seed_and_history_ids() -> Result<()> {
        let mut store = seeded_store()?;
        store.apply(&PresetCommand::RenameDepartment.command(), datetime!(2025-01-01 0:00))?;
        assert_eq!(store.version_count(HistoryTable::Department)?, 4);

        let outcome = store.apply(&MutationCommand::Reset, datetime!(2025-02-01 0:00))?;
        assert_eq!(outcome.inserted_versions, 7);
        assert_eq!(store.version_count(HistoryTable::Department)?, 2);
        let rows = store.fetch(HistoryTable::Department, None)?;
        assert_eq!(rows.iter().map(|row| row.record_id.0).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!store.seed_if_empty()?);
        Ok(())
    }

    #[test]
    fn mutation_command_serializes_with_kind_tag() -> Result<()> {
        let value = serde_json::to_value(PresetCommand::PromoteEmployee.command())?;
        assert_eq!(value["kind"], json!("amend"));
        assert_eq!(value["table"], json!("employee"));
        assert_eq!(value["valid_from"], json!("2025-10-01 00:00:00"));
        assert_eq!(serde_json::to_value(MutationCommand::Reset)?, json!({ "kind": "reset" }));
        Ok(())
    }

    proptest! {
        #[test]
        fn property_random_amendments_never_break_the_data_model(
            edits in prop::collection::vec((1_i64..90, 0_i64..3_000, any::<bool>()), 1..6),
        ) {
            let store = seeded_store();
            prop_assert!(store.is_ok());
            let mut store = store.unwrap_or_else(|_| unreachable!());

            let mut at = datetime!(2024-10-01 0:00);
            for (step, offset, rename) in edits {
                at += time::Duration::days(step);
                let valid_from = datetime!(2019-01-01 0:00) + time::Duration::days(offset);
                let (table, entity_id, column) = if rename {
                    (HistoryTable::Department, 10, "dept_name")
                } else {
                    (HistoryTable::Employee, 101, "job_title")
                };
                let command = MutationCommand::Amend {
                    table,
                    entity_id,
                    changes: Map::from_iter([(column.to_string(), json!(format!("edit {step}")))]),
                    valid_from,
                };
                prop_assert!(store.apply(&command, at).is_ok());
            }

            for table in HistoryTable::ALL {
                let dataset = store.load_dataset(table, None);
                prop_assert!(dataset.is_ok(), "{:?}", dataset.as_ref().err());
            }
        }
    }
}
