//! Weekly activity heatmaps with per-slot manual corrections.
//!
//! Events are bucketed into 7x24 `(weekday, hour)` grids over week windows,
//! corrections are overlaid per cell, and windows are shown side by side or
//! summed. [`session::EditSession`] drives the correction workflow against any
//! [`store::ActivityStore`].

pub mod calendar;
pub mod combine;
pub mod details;
pub mod error;
pub mod filter;
pub mod grid;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod model;
pub mod palette;
pub mod range;
pub mod reconcile;
pub mod selection;
pub mod session;
pub mod store;
pub mod timestamp;
pub mod view;

pub use combine::{combine, CombineMode, CombinedView, Layout, Legend, SubCell, WindowGrid};
pub use error::{Error, RecordError, Result, ValidationError};
pub use filter::{filter_adjustments, filter_events, FilterContext, FilterOptions, FirstSeenDays};
pub use grid::{build_grid, CellPos, Grid};
pub use model::{Adjustment, Event, EventValue, NewAdjustment, RawAdjustment, RawEvent, Sensor};
pub use range::{compute_windows, DataBounds, WeekSpan, WeekWindow, MAX_WEEKS_TO_VIEW};
pub use reconcile::{
    clear_adjustment, open_adjustment_target, save_adjustment, AdjustmentTarget, ReconcileContext,
    SlotPlan,
};
pub use selection::SensorSelection;
pub use session::{EditSession, SessionOutcome};
pub use store::{ActivityStore, Snapshot};
pub use timestamp::NaiveTimestampPolicy;
pub use view::{HeatmapView, ViewParams};
