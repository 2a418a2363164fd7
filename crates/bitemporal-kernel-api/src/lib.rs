use std::path::{Path, PathBuf};

use anyhow::Result;
use bitemporal_kernel_store_sqlite::{PresetCommand, SchemaStatus, SqliteHistoryStore};
use serde::{Deserialize, Serialize};

mod config;
mod session;

pub use config::{ViewerConfig, DEFAULT_DB_PATH};
pub use session::{
    ApplyResult, DatasetSummary, DatasetView, HoverView, RefreshReport, ViewerSession,
};

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub inferred_from_legacy: bool,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresetInfo {
    pub name: String,
    pub title: String,
    pub description: String,
}

/// Database administration that does not need a loaded viewer.
#[derive(Debug, Clone)]
pub struct BitemporalKernelApi {
    db_path: PathBuf,
}

impl BitemporalKernelApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> Result<SqliteHistoryStore> {
        SqliteHistoryStore::open(&self.db_path)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                inferred_from_legacy: before.inferred_from_legacy,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            inferred_from_legacy: before.inferred_from_legacy,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Copy the database to `out_file` with the `SQLite` online backup API.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or the backup fails.
    pub fn backup(&self, out_file: &Path) -> Result<()> {
        let store = self.open_store()?;
        store.backup_database(out_file)
    }

    #[must_use]
    pub fn presets() -> Vec<PresetInfo> {
        PresetCommand::ALL
            .into_iter()
            .map(|preset| PresetInfo {
                name: preset.as_str().to_string(),
                title: preset.title().to_string(),
                description: preset.description().to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn unique_temp_db_path() -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
            .as_nanos();
        std::env::temp_dir().join(format!("bitemporal-kernel-api-{now}.sqlite3"))
    }

    #[test]
    fn migrate_dry_run_then_apply() -> Result<()> {
        let api = BitemporalKernelApi::new(unique_temp_db_path());

        let planned = api.migrate(true)?;
        assert!(planned.dry_run);
        assert_eq!(planned.would_apply_versions, vec![1]);
        assert_eq!(api.schema_status()?.current_version, 0);

        let applied = api.migrate(false)?;
        assert_eq!(applied.after_version, Some(1));
        assert_eq!(applied.up_to_date, Some(true));
        Ok(())
    }

    #[test]
    fn backup_copies_a_migrated_database() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = BitemporalKernelApi::new(db_path.clone());
        api.migrate(false)?;

        let backup_path = db_path.with_extension("backup.sqlite3");
        api.backup(&backup_path)?;
        let restored = BitemporalKernelApi::new(backup_path);
        assert_eq!(restored.schema_status()?.current_version, 1);
        Ok(())
    }

    #[test]
    fn presets_list_every_button() {
        let presets = BitemporalKernelApi::presets();
        assert_eq!(
            presets.iter().map(|preset| preset.name.as_str()).collect::<Vec<_>>(),
            vec!["reset", "rename-department", "restore-department", "promote-employee"]
        );
        assert_eq!(presets[1].title, "Update #1");
    }
}
