use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bitemporal_kernel_core::{AxisScale, PointInverter, ProjectionOptions};
use bitemporal_kernel_store_sqlite::HistoryTable;
use serde::{Deserialize, Serialize};
use time::Duration;

pub const DEFAULT_DB_PATH: &str = "./bitemporal_kernel.sqlite3";

/// A thousand years; open bounds never need to be drawn further out.
const MAX_OPEN_EXTENSION_WEEKS: i64 = 52_000;
const SECONDS_PER_WEEK: i64 = 604_800;

/// Viewer settings, loadable from YAML. Missing keys take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub db_path: PathBuf,
    /// How far past now open bounds are drawn.
    pub open_extension_weeks: i64,
    /// Rounding tick for pointer inversion.
    pub resolution_seconds: i64,
    /// Show only entities that have belonged to this department; `null` shows all.
    pub department_id: Option<i64>,
    pub datasets: Vec<HistoryTable>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            open_extension_weeks: 52,
            resolution_seconds: 1,
            department_id: Some(10),
            datasets: HistoryTable::ALL.to_vec(),
        }
    }
}

impl ViewerConfig {
    /// # Errors
    /// Returns an error when the YAML is malformed or the result fails validation.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("failed to parse viewer config")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error when the file cannot be read or its content is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read viewer config {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("invalid viewer config {}", path.display()))
    }

    /// # Errors
    /// Returns an error for an extension outside `1..=52000` weeks, a resolution
    /// outside one second to one day, or an empty or repeating dataset list.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_OPEN_EXTENSION_WEEKS).contains(&self.open_extension_weeks) {
            return Err(anyhow!(
                "open_extension_weeks must be within 1..={MAX_OPEN_EXTENSION_WEEKS}, got {}",
                self.open_extension_weeks
            ));
        }
        if self.resolution_seconds <= 0 || self.resolution_seconds > 86_400 {
            return Err(anyhow!(
                "resolution_seconds must be within 1..=86400, got {}",
                self.resolution_seconds
            ));
        }
        if self.datasets.is_empty() {
            return Err(anyhow!("datasets must name at least one history table"));
        }
        let unique = self.datasets.iter().collect::<BTreeSet<_>>();
        if unique.len() != self.datasets.len() {
            return Err(anyhow!("datasets must not repeat a history table"));
        }
        Ok(())
    }

    /// # Errors
    /// Returns an error when the configured resolution is rejected by the kernel.
    pub fn axis_scale(&self) -> Result<AxisScale> {
        Ok(AxisScale::new(Duration::seconds(self.resolution_seconds))?)
    }

    /// # Errors
    /// Returns an error when the extension does not fit a duration or the kernel
    /// rejects the resolution.
    pub fn projection_options(&self) -> Result<ProjectionOptions> {
        let extension = self
            .open_extension_weeks
            .checked_mul(SECONDS_PER_WEEK)
            .map(Duration::seconds)
            .ok_or_else(|| {
                anyhow!("open_extension_weeks {} is too large", self.open_extension_weeks)
            })?;
        Ok(ProjectionOptions::new(extension, self.axis_scale()?)?)
    }

    /// # Errors
    /// See [`ViewerConfig::axis_scale`].
    pub fn inverter(&self) -> Result<PointInverter> {
        Ok(PointInverter::new(self.axis_scale()?))
    }
}
