//! Histories as axis-aligned rectangles on the (valid, transaction) plane.

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::dataset::TemporalDataset;
use crate::instant::{serde_instant, Instant};
use crate::model::{display_value, EntityKey, Interval, RecordId, RecordStatus, TemporalRecord};
use crate::scale::AxisScale;
use crate::KernelError;

const DEFAULT_OPEN_EXTENSION_WEEKS: i64 = 52;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ProjectionOptions {
    /// How far past `now` an open upper bound is drawn.
    pub open_extension: Duration,
    pub scale: AxisScale,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            open_extension: Duration::weeks(DEFAULT_OPEN_EXTENSION_WEEKS),
            scale: AxisScale::default(),
        }
    }
}

impl ProjectionOptions {
    /// # Errors
    /// Returns [`KernelError::InvalidScale`] when `open_extension` is not positive.
    pub fn new(open_extension: Duration, scale: AxisScale) -> Result<Self, KernelError> {
        if !open_extension.is_positive() {
            return Err(KernelError::InvalidScale(format!(
                "open extension MUST be positive, got {open_extension}"
            )));
        }
        Ok(Self { open_extension, scale })
    }
}

/// Closed-open extent of a rectangle along one axis, in instants and plane units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AxisSpan {
    #[serde(with = "serde_instant")]
    pub from: Instant,
    #[serde(with = "serde_instant")]
    pub to: Instant,
    pub start: f64,
    pub end: f64,
    /// The upper edge stands in for an open bound.
    pub clamped: bool,
}

impl AxisSpan {
    fn project(interval: Interval, horizon: Instant, scale: AxisScale) -> Self {
        let to = interval.to.closed().unwrap_or_else(|| horizon.max(interval.from));
        Self {
            from: interval.from,
            to,
            start: scale.to_plane(interval.from),
            end: scale.to_plane(to),
            clamped: interval.to.is_open(),
        }
    }

    #[must_use]
    pub fn contains(&self, coordinate: f64) -> bool {
        self.start <= coordinate && coordinate < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaneRectangle {
    pub record_id: RecordId,
    pub entity_key: EntityKey,
    pub status: RecordStatus,
    /// Valid time.
    pub x: AxisSpan,
    /// Transaction time.
    pub y: AxisSpan,
    pub label: String,
}

impl PlaneRectangle {
    #[must_use]
    pub fn contains(&self, plane_x: f64, plane_y: f64) -> bool {
        self.x.contains(plane_x) && self.y.contains(plane_y)
    }
}

/// "Today" marker drawn on both axes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReferenceLines {
    #[serde(with = "serde_instant")]
    pub today: Instant,
    pub x: f64,
    pub y: f64,
}

/// Visible plane extent; both maxima sit at `now + open_extension`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlaneBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl PlaneBounds {
    #[must_use]
    pub fn contains(&self, plane_x: f64, plane_y: f64) -> bool {
        (self.x_min..=self.x_max).contains(&plane_x) && (self.y_min..=self.y_max).contains(&plane_y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Projection {
    pub dataset: String,
    /// One rectangle per record, in dataset order.
    pub rectangles: Vec<PlaneRectangle>,
    pub today: ReferenceLines,
    pub bounds: PlaneBounds,
}

impl Projection {
    /// First rectangle in dataset order containing the coordinate.
    #[must_use]
    pub fn hit_test(&self, plane_x: f64, plane_y: f64) -> Option<&PlaneRectangle> {
        self.rectangles.iter().find(|rectangle| rectangle.contains(plane_x, plane_y))
    }

    /// Every rectangle containing the coordinate, in dataset order.
    #[must_use]
    pub fn hits(&self, plane_x: f64, plane_y: f64) -> Vec<&PlaneRectangle> {
        self.rectangles.iter().filter(|rectangle| rectangle.contains(plane_x, plane_y)).collect()
    }

    #[must_use]
    pub fn contains(&self, plane_x: f64, plane_y: f64) -> bool {
        self.bounds.contains(plane_x, plane_y)
    }
}

/// Project every record of `dataset` onto the plane as seen at `now`.
#[must_use]
pub fn project(dataset: &TemporalDataset, now: Instant, options: &ProjectionOptions) -> Projection {
    let scale = options.scale;
    let extension = options.open_extension;
    let horizon = now.saturating_add(extension);

    let rectangles = dataset
        .records()
        .iter()
        .map(|record| PlaneRectangle {
            record_id: record.record_id,
            entity_key: record.entity_key.clone(),
            status: record.status(),
            x: AxisSpan::project(record.valid, horizon, scale),
            y: AxisSpan::project(record.transaction, horizon, scale),
            label: label_for(dataset, record),
        })
        .collect::<Vec<_>>();

    let earliest = |lower: fn(&TemporalRecord) -> Instant| {
        dataset.records().iter().map(lower).min().unwrap_or(now).saturating_sub(extension)
    };
    let bounds = PlaneBounds {
        x_min: scale.to_plane(earliest(|record| record.valid.from)),
        x_max: scale.to_plane(horizon),
        y_min: scale.to_plane(earliest(|record| record.transaction.from)),
        y_max: scale.to_plane(horizon),
    };

    let today_coordinate = scale.to_plane(now);
    Projection {
        dataset: dataset.name().to_string(),
        rectangles,
        today: ReferenceLines { today: now, x: today_coordinate, y: today_coordinate },
        bounds,
    }
}

fn label_for(dataset: &TemporalDataset, record: &TemporalRecord) -> String {
    let schema = dataset.schema();
    schema
        .label_columns
        .iter()
        .map(|column| {
            if *column == schema.id_column {
                record.record_id.to_string()
            } else if *column == schema.key_column {
                record.entity_key.to_string()
            } else {
                record.attributes.get(column).map_or_else(|| "-".to_string(), display_value)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
