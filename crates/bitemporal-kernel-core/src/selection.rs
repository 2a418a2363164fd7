//! One cursor, many datasets.
//!
//! The synchronizer inverts a plane coordinate once and resolves the resulting
//! temporal point against every installed dataset. It keeps no per-event state,
//! so repeating an event reproduces the same update.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataset::TemporalDataset;
use crate::instant::Instant;
use crate::matcher::{match_dataset, match_dataset_with_report};
use crate::model::RecordId;
use crate::projector::{project, Projection, ProjectionOptions};
use crate::scale::{PointInverter, TemporalPoint};
use crate::{AmbiguousMatchError, KernelError};

/// Dataset name to the records highlighted in it.
pub type Highlights = BTreeMap<String, BTreeSet<RecordId>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Moved { x: f64, y: f64 },
    Left,
}

/// Outcome of one pointer event. `point` is `None` after the pointer left the plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectionUpdate {
    pub point: Option<TemporalPoint>,
    pub highlights: Highlights,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguities: Vec<AmbiguousMatchError>,
}

/// Receives drawing instructions. Colours, fonts and layout belong to the sink.
pub trait RenderSink {
    /// Called once per dataset on every refresh.
    fn render_dataset(&mut self, dataset: &TemporalDataset, projection: &Projection);

    /// Called once per dataset on every pointer event; an empty set clears it.
    fn highlight(&mut self, dataset: &str, record_ids: &BTreeSet<RecordId>);

    fn cursor(&mut self, _point: Option<TemporalPoint>) {}
}

#[derive(Debug, Clone, Default)]
pub struct SelectionSynchronizer {
    datasets: BTreeMap<String, Arc<TemporalDataset>>,
    inverter: PointInverter,
}

impl SelectionSynchronizer {
    #[must_use]
    pub fn new(inverter: PointInverter) -> Self {
        Self { datasets: BTreeMap::new(), inverter }
    }

    #[must_use]
    pub fn inverter(&self) -> PointInverter {
        self.inverter
    }

    /// Register `dataset` under its name, returning the dataset it replaced.
    pub fn install(&mut self, dataset: Arc<TemporalDataset>) -> Option<Arc<TemporalDataset>> {
        let name = dataset.name().to_string();
        tracing::debug!(dataset = %name, fingerprint = dataset.fingerprint(), "installing dataset");
        self.datasets.insert(name, dataset)
    }

    /// Swap the whole dataset set in one step.
    pub fn replace_all<I>(&mut self, datasets: I)
    where
        I: IntoIterator<Item = Arc<TemporalDataset>>,
    {
        self.datasets = datasets
            .into_iter()
            .map(|dataset| (dataset.name().to_string(), dataset))
            .collect();
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<TemporalDataset>> {
        self.datasets.remove(name)
    }

    #[must_use]
    pub fn dataset(&self, name: &str) -> Option<&Arc<TemporalDataset>> {
        self.datasets.get(name)
    }

    pub fn datasets(&self) -> impl Iterator<Item = &Arc<TemporalDataset>> {
        self.datasets.values()
    }

    #[must_use]
    pub fn dataset_names(&self) -> Vec<&str> {
        self.datasets.keys().map(String::as_str).collect()
    }

    /// Highlights for the temporal point under plane coordinate `(x, y)`.
    ///
    /// Allocates only the highlight sets; ambiguity diagnostics go through
    /// [`SelectionSynchronizer::resolve`].
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidCoordinate`] when either coordinate is not finite.
    pub fn on_point(&self, plane_x: f64, plane_y: f64) -> Result<Highlights, KernelError> {
        let point = self.inverter.invert(plane_x, plane_y)?;
        Ok(self
            .datasets
            .iter()
            .map(|(name, dataset)| (name.clone(), match_dataset(dataset, point)))
            .collect())
    }

    /// Every installed dataset mapped to an empty set.
    #[must_use]
    pub fn on_leave(&self) -> Highlights {
        self.datasets.keys().map(|name| (name.clone(), BTreeSet::new())).collect()
    }

    /// Match an already-inverted point against every installed dataset.
    #[must_use]
    pub fn resolve(&self, point: TemporalPoint) -> SelectionUpdate {
        let mut update = SelectionUpdate { point: Some(point), ..SelectionUpdate::default() };
        for (name, dataset) in &self.datasets {
            let report = match_dataset_with_report(dataset, point);
            update.highlights.insert(name.clone(), report.record_ids);
            update.ambiguities.extend(report.ambiguities);
        }
        update
    }

    /// Turn a pointer event into an update and push it into `sink`.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidCoordinate`] for a move to a non-finite
    /// coordinate; the sink is left untouched in that case.
    pub fn dispatch<S>(&self, event: PointerEvent, sink: &mut S) -> Result<SelectionUpdate, KernelError>
    where
        S: RenderSink + ?Sized,
    {
        let update = match event {
            PointerEvent::Moved { x, y } => self.resolve(self.inverter.invert(x, y)?),
            PointerEvent::Left => {
                SelectionUpdate { point: None, highlights: self.on_leave(), ambiguities: Vec::new() }
            }
        };

        sink.cursor(update.point);
        for (name, record_ids) in &update.highlights {
            sink.highlight(name, record_ids);
        }
        Ok(update)
    }

    /// Projections of every installed dataset as seen at `now`, by dataset name.
    #[must_use]
    pub fn projections(&self, now: Instant, options: &ProjectionOptions) -> Vec<Projection> {
        self.datasets.values().map(|dataset| project(dataset, now, options)).collect()
    }

    /// Project every installed dataset and hand each to `sink`.
    pub fn render<S>(&self, now: Instant, options: &ProjectionOptions, sink: &mut S)
    where
        S: RenderSink + ?Sized,
    {
        for dataset in self.datasets.values() {
            let projection = project(dataset, now, options);
            sink.render_dataset(dataset, &projection);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};
    use time::macros::datetime;

    use super::*;
    use crate::model::{DatasetSchema, EntityKey, TemporalRow};
    use crate::scale::AxisScale;

    fn department_row(
        record_id: i64,
        name: &str,
        valid: (Instant, Option<Instant>),
        tran: (Instant, Option<Instant>),
    ) -> TemporalRow {
        let mut attributes = Map::new();
        attributes.insert("dept_name".to_string(), json!(name));
        TemporalRow {
            record_id: RecordId(record_id),
            entity_key: EntityKey::new("10"),
            attributes,
            valid_from: Some(valid.0),
            valid_to: valid.1,
            tran_from: Some(tran.0),
            tran_to: tran.1,
        }
    }

    fn departments() -> Arc<TemporalDataset> {
        let schema = DatasetSchema::new("Department", "dept_hist_id", "dept_id", &["dept_name"], &[])
            .unwrap_or_else(|err| panic!("schema: {err}"));
        let rows = vec![
            department_row(
                1,
                "Sales",
                (datetime!(2020-06-01 0:00), None),
                (datetime!(2024-01-01 0:00), Some(datetime!(2025-01-01 0:00))),
            ),
            department_row(
                2,
                "Sales",
                (datetime!(2020-06-01 0:00), Some(datetime!(2025-10-01 0:00))),
                (datetime!(2025-01-01 0:00), None),
            ),
            department_row(
                3,
                "New Sales",
                (datetime!(2025-10-01 0:00), None),
                (datetime!(2025-01-01 0:00), None),
            ),
        ];
        Arc::new(
            TemporalDataset::load(schema, rows).unwrap_or_else(|err| panic!("departments: {err}")),
        )
    }

    fn employees() -> Arc<TemporalDataset> {
        let schema = DatasetSchema::new("Employee", "emp_hist_id", "emp_id", &["job_title"], &[])
            .unwrap_or_else(|err| panic!("schema: {err}"));
        let mut attributes = Map::new();
        attributes.insert("job_title".to_string(), json!("Sales Rep"));
        let rows = vec![TemporalRow {
            record_id: RecordId(100),
            entity_key: EntityKey::new("100"),
            attributes,
            valid_from: Some(datetime!(2021-01-01 0:00)),
            valid_to: None,
            tran_from: Some(datetime!(2024-01-01 0:00)),
            tran_to: None,
        }];
        Arc::new(TemporalDataset::load(schema, rows).unwrap_or_else(|err| panic!("employees: {err}")))
    }

    fn synchronizer() -> SelectionSynchronizer {
        let mut synchronizer = SelectionSynchronizer::default();
        synchronizer.install(departments());
        synchronizer.install(employees());
        synchronizer
    }

    fn plane(point: TemporalPoint) -> (f64, f64) {
        PointInverter::default().locate(point)
    }

    #[derive(Default)]
    struct RecordingSink {
        rendered: Vec<(String, usize)>,
        highlights: Vec<(String, Vec<i64>)>,
        cursors: Vec<Option<TemporalPoint>>,
    }

    impl RenderSink for RecordingSink {
        fn render_dataset(&mut self, dataset: &TemporalDataset, projection: &Projection) {
            self.rendered.push((dataset.name().to_string(), projection.rectangles.len()));
        }

        fn highlight(&mut self, dataset: &str, record_ids: &BTreeSet<RecordId>) {
            self.highlights
                .push((dataset.to_string(), record_ids.iter().map(|id| id.0).collect()));
        }

        fn cursor(&mut self, point: Option<TemporalPoint>) {
            self.cursors.push(point);
        }
    }

    #[test]
    fn on_point_resolves_each_dataset_independently() -> Result<(), KernelError> {
        let synchronizer = synchronizer();
        let (x, y) = plane(TemporalPoint::new(datetime!(2024-06-01 0:00), datetime!(2021-01-01 0:00)));
        let highlights = synchronizer.on_point(x, y)?;
        assert_eq!(highlights["Department"], BTreeSet::from([RecordId(1)]));
        assert_eq!(highlights["Employee"], BTreeSet::from([RecordId(100)]));

        let (x, y) = plane(TemporalPoint::new(datetime!(2025-06-01 0:00), datetime!(2020-07-01 0:00)));
        let highlights = synchronizer.on_point(x, y)?;
        assert_eq!(highlights["Department"], BTreeSet::from([RecordId(2)]));
        assert!(highlights["Employee"].is_empty());
        Ok(())
    }

    #[test]
    fn empty_match_and_leave_are_distinct() -> Result<(), KernelError> {
        let synchronizer = synchronizer();
        let mut sink = RecordingSink::default();

        let (x, y) = plane(TemporalPoint::new(datetime!(2023-01-01 0:00), datetime!(2021-01-01 0:00)));
        let miss = synchronizer.dispatch(PointerEvent::Moved { x, y }, &mut sink)?;
        assert!(miss.point.is_some());
        assert!(miss.highlights.values().all(BTreeSet::is_empty));

        let left = synchronizer.dispatch(PointerEvent::Left, &mut sink)?;
        assert_eq!(left.point, None);
        assert_eq!(left.highlights, synchronizer.on_leave());
        assert_eq!(left.highlights.len(), 2);

        assert_eq!(sink.cursors.len(), 2);
        assert!(sink.cursors[0].is_some());
        assert_eq!(sink.cursors[1], None);
        assert_eq!(sink.highlights.len(), 4);
        Ok(())
    }

    #[test]
    fn on_point_agrees_with_resolve() -> Result<(), KernelError> {
        let synchronizer = synchronizer();
        for point in [
            TemporalPoint::new(datetime!(2024-06-01 0:00), datetime!(2021-01-01 0:00)),
            TemporalPoint::new(datetime!(2025-06-01 0:00), datetime!(2026-01-01 0:00)),
            TemporalPoint::new(datetime!(2023-01-01 0:00), datetime!(2021-01-01 0:00)),
        ] {
            let (x, y) = plane(point);
            assert_eq!(synchronizer.on_point(x, y)?, synchronizer.resolve(point).highlights);
        }
        Ok(())
    }

    #[test]
    fn repeated_events_are_idempotent() -> Result<(), KernelError> {
        let synchronizer = synchronizer();
        let (x, y) = plane(TemporalPoint::new(datetime!(2025-06-01 0:00), datetime!(2026-01-01 0:00)));
        let first = synchronizer.on_point(x, y)?;
        let second = synchronizer.on_point(x, y)?;
        assert_eq!(first, second);
        assert_eq!(first["Department"], BTreeSet::from([RecordId(3)]));
        Ok(())
    }

    #[test]
    fn invalid_coordinate_leaves_sink_untouched() {
        let synchronizer = synchronizer();
        let mut sink = RecordingSink::default();
        let result = synchronizer.dispatch(PointerEvent::Moved { x: f64::NAN, y: 0.0 }, &mut sink);
        assert!(matches!(result, Err(KernelError::InvalidCoordinate(_))));
        assert!(sink.cursors.is_empty());
        assert!(sink.highlights.is_empty());
    }

    #[test]
    fn install_replaces_and_remove_unregisters() {
        let mut synchronizer = synchronizer();
        let previous = synchronizer.install(departments());
        assert!(previous.is_some());
        assert_eq!(synchronizer.dataset_names(), vec!["Department", "Employee"]);

        assert!(synchronizer.remove("Employee").is_some());
        assert_eq!(synchronizer.dataset_names(), vec!["Department"]);
        assert!(synchronizer.on_leave().contains_key("Department"));
        assert!(!synchronizer.on_leave().contains_key("Employee"));

        synchronizer.replace_all(vec![employees()]);
        assert_eq!(synchronizer.dataset_names(), vec!["Employee"]);
    }

    #[test]
    fn render_projects_every_dataset() -> Result<(), KernelError> {
        let scale = AxisScale::new(time::Duration::minutes(1))?;
        let mut synchronizer = SelectionSynchronizer::new(PointInverter::new(scale));
        synchronizer.install(departments());
        synchronizer.install(employees());

        let mut sink = RecordingSink::default();
        synchronizer.render(datetime!(2026-10-18 0:00), &ProjectionOptions::default(), &mut sink);
        assert_eq!(
            sink.rendered,
            vec![("Department".to_string(), 3), ("Employee".to_string(), 1)]
        );
        assert_eq!(
            synchronizer.projections(datetime!(2026-10-18 0:00), &ProjectionOptions::default()).len(),
            2
        );
        Ok(())
    }
}
