use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use bitemporal_kernel_core::{
    Highlights, Instant, PointerEvent, Projection, ProjectionOptions, RecordId, RenderSink,
    SelectionSynchronizer, SelectionUpdate, TableRow, TemporalDataset, TemporalPoint,
};
use bitemporal_kernel_store_sqlite::{
    now_naive, HistoryTable, MutationCommand, MutationOutcome, PresetCommand, SqliteHistoryStore,
};
use serde::{Deserialize, Serialize};

use crate::config::ViewerConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetSummary {
    pub name: String,
    pub records: usize,
    pub entities: usize,
    pub fingerprint: String,
}

impl DatasetSummary {
    fn of(dataset: &TemporalDataset) -> Self {
        Self {
            name: dataset.name().to_string(),
            records: dataset.len(),
            entities: dataset.entity_keys().len(),
            fingerprint: dataset.fingerprint().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshReport {
    pub datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyResult {
    pub outcome: MutationOutcome,
    pub refresh: RefreshReport,
}

/// Table and chart content for one dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetView {
    pub name: String,
    pub fingerprint: String,
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
    pub projection: Projection,
}

/// What the viewer shows for one pointer position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoverView {
    pub point: Option<TemporalPoint>,
    pub caption: Option<String>,
    pub inside_plane: BTreeMap<String, bool>,
    /// Topmost rectangle under the pointer in each chart.
    pub hits: BTreeMap<String, Option<RecordId>>,
    pub highlights: Highlights,
}

/// Store, installed datasets and cursor resolution for one viewer.
pub struct ViewerSession {
    config: ViewerConfig,
    options: ProjectionOptions,
    store: SqliteHistoryStore,
    synchronizer: SelectionSynchronizer,
    clock: Option<Instant>,
}

impl ViewerSession {
    /// Open the configured database, migrate it, seed it when empty and load
    /// every configured dataset.
    ///
    /// # Errors
    /// Returns an error when the config is invalid, the database cannot be
    /// prepared, or the initial refresh fails.
    pub fn open(config: ViewerConfig) -> Result<Self> {
        Self::open_at(config, None)
    }

    /// Like [`ViewerSession::open`] with a fixed clock instead of the wall clock.
    ///
    /// # Errors
    /// See [`ViewerSession::open`].
    pub fn open_at(config: ViewerConfig, clock: Option<Instant>) -> Result<Self> {
        config.validate()?;
        let options = config.projection_options()?;
        let mut store = SqliteHistoryStore::open(&config.db_path)?;
        store.migrate()?;
        if store.seed_if_empty()? {
            tracing::debug!(db_path = %config.db_path.display(), "seeded empty history database");
        }

        let mut session = Self {
            synchronizer: SelectionSynchronizer::new(config.inverter()?),
            config,
            options,
            store,
            clock,
        };
        session.refresh().context("initial refresh failed")?;
        Ok(session)
    }

    #[must_use]
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    #[must_use]
    pub fn synchronizer(&self) -> &SelectionSynchronizer {
        &self.synchronizer
    }

    /// Pin "now" for projections and mutations; `None` returns to the wall clock.
    pub fn set_clock(&mut self, clock: Option<Instant>) {
        self.clock = clock;
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.unwrap_or_else(now_naive)
    }

    /// Reload every configured dataset and install them together.
    ///
    /// When any dataset fails to load, none is installed and the previous ones stay.
    ///
    /// # Errors
    /// Returns an error when a fetch fails or a stored history is malformed.
    pub fn refresh(&mut self) -> Result<RefreshReport> {
        let loaded = self
            .config
            .datasets
            .iter()
            .map(|table| self.store.load_dataset(*table, self.config.department_id).map(Arc::new))
            .collect::<Result<Vec<_>>>();

        match loaded {
            Ok(datasets) => {
                let report = RefreshReport {
                    datasets: datasets.iter().map(|dataset| DatasetSummary::of(dataset)).collect(),
                };
                self.synchronizer.replace_all(datasets);
                tracing::debug!(datasets = report.datasets.len(), "refreshed viewer datasets");
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(
                    error = %format!("{err:#}"),
                    "refresh rejected; keeping previously installed datasets"
                );
                Err(err)
            }
        }
    }

    /// Apply `command` at the session's current instant, then refresh.
    ///
    /// # Errors
    /// Returns an error when the store refuses the command or the refresh fails.
    pub fn apply(&mut self, command: &MutationCommand) -> Result<ApplyResult> {
        let outcome = self.store.apply(command, self.now())?;
        let refresh = self.refresh()?;
        Ok(ApplyResult { outcome, refresh })
    }

    /// # Errors
    /// See [`ViewerSession::apply`].
    pub fn apply_preset(&mut self, preset: PresetCommand) -> Result<ApplyResult> {
        tracing::debug!(preset = %preset, "applying preset");
        self.apply(&preset.command())
    }

    /// Table rows and projection of each installed dataset, optionally only one.
    #[must_use]
    pub fn show(&self, only: Option<HistoryTable>) -> Vec<DatasetView> {
        let now = self.now();
        self.config
            .datasets
            .iter()
            .filter(|table| only.map_or(true, |wanted| wanted == **table))
            .filter_map(|table| self.synchronizer.dataset(table.dataset_name()))
            .map(|dataset| DatasetView {
                name: dataset.name().to_string(),
                fingerprint: dataset.fingerprint().to_string(),
                columns: dataset.schema().columns().into_iter().map(str::to_string).collect(),
                rows: dataset.table_rows(),
                projection: bitemporal_kernel_core::project(dataset, now, &self.options),
            })
            .collect()
    }

    /// Highlights for an explicit temporal point.
    #[must_use]
    pub fn match_point(&self, point: TemporalPoint) -> SelectionUpdate {
        self.synchronizer.resolve(point)
    }

    /// Resolve a pointer position given in plane units.
    ///
    /// Hit testing uses the inverted point, so `hits` and `highlights` describe the
    /// same instant at any resolution.
    ///
    /// # Errors
    /// Returns an error when a coordinate is not finite.
    pub fn hover(&self, plane_x: f64, plane_y: f64) -> Result<HoverView> {
        let inverter = self.synchronizer.inverter();
        let highlights = self.synchronizer.on_point(plane_x, plane_y)?;
        let point = inverter.invert(plane_x, plane_y)?;
        let (snapped_x, snapped_y) = inverter.locate(point);

        let mut inside_plane = BTreeMap::new();
        let mut hits = BTreeMap::new();
        for projection in self.synchronizer.projections(self.now(), &self.options) {
            inside_plane.insert(projection.dataset.clone(), projection.contains(plane_x, plane_y));
            hits.insert(
                projection.dataset.clone(),
                projection.hit_test(snapped_x, snapped_y).map(|rectangle| rectangle.record_id),
            );
        }

        Ok(HoverView {
            point: Some(point),
            caption: Some(point.caption()),
            inside_plane,
            hits,
            highlights,
        })
    }

    /// The pointer left every chart.
    #[must_use]
    pub fn leave(&self) -> HoverView {
        HoverView {
            point: None,
            caption: None,
            inside_plane: BTreeMap::new(),
            hits: BTreeMap::new(),
            highlights: self.synchronizer.on_leave(),
        }
    }

    /// Forward a pointer event to `sink`.
    ///
    /// # Errors
    /// Returns an error when a move carries a non-finite coordinate.
    pub fn dispatch<S>(&self, event: PointerEvent, sink: &mut S) -> Result<SelectionUpdate>
    where
        S: RenderSink + ?Sized,
    {
        Ok(self.synchronizer.dispatch(event, sink)?)
    }

    /// Draw every installed dataset into `sink`.
    pub fn render<S>(&self, sink: &mut S)
    where
        S: RenderSink + ?Sized,
    {
        self.synchronizer.render(self.now(), &self.options, sink);
    }
}
