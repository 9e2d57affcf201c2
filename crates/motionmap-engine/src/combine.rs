//! Stacks per-window grids side by side or into one overlay.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::range::WeekWindow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombineMode {
    #[default]
    Separate,
    /// One overlay of per-cell totals. Without `sum` each cell also exposes
    /// the individual per-window counts.
    Aggregate { sum: bool },
}

/// One window's share of an aggregated cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCell {
    pub count: u32,
    pub adjusted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGrid {
    pub window: WeekWindow,
    pub grid: Grid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Layout {
    Separate {
        windows: Vec<WindowGrid>,
    },
    Aggregate {
        totals: Grid,
        windows: Vec<WindowGrid>,
        sum: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendTick {
    pub value: u32,
    /// Percentage along the scale, `0.0..=100.0`.
    pub position: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Legend {
    pub max_count: u32,
    /// Distinct nonzero values shown, ascending.
    pub values: Vec<u32>,
}

impl Legend {
    fn from_grids<'a>(grids: impl IntoIterator<Item = &'a Grid>) -> Self {
        let mut values = BTreeSet::new();
        for grid in grids {
            values.extend(grid.counts().iter().flatten().copied().filter(|&c| c > 0));
        }
        Self {
            max_count: values.last().copied().unwrap_or(0),
            values: values.into_iter().collect(),
        }
    }

    pub fn ticks(&self) -> Vec<LegendTick> {
        if self.max_count == 0 {
            return Vec::new();
        }
        let max = f64::from(self.max_count);
        self.values
            .iter()
            .map(|&value| LegendTick {
                value,
                position: f64::from(value) / max * 100.0,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedView {
    pub layout: Layout,
    /// Shared normalization maximum for every displayed cell.
    pub max_count: u32,
    pub legend: Legend,
}

impl CombinedView {
    /// Per-window values of one cell, in aggregate mode without `sum` only.
    pub fn sub_cells(&self, hour: usize, day: usize) -> Option<Vec<SubCell>> {
        match &self.layout {
            Layout::Aggregate {
                windows,
                sum: false,
                ..
            } => Some(
                windows
                    .iter()
                    .map(|w| SubCell {
                        count: w.grid.count(hour, day),
                        adjusted: w.grid.is_adjusted(hour, day),
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn windows(&self) -> &[WindowGrid] {
        match &self.layout {
            Layout::Separate { windows } | Layout::Aggregate { windows, .. } => windows,
        }
    }

    pub fn totals(&self) -> Option<&Grid> {
        match &self.layout {
            Layout::Aggregate { totals, .. } => Some(totals),
            Layout::Separate { .. } => None,
        }
    }
}

/// Cell-wise sum; a cell is adjusted if any input marked it.
pub fn sum_grids<'a>(grids: impl IntoIterator<Item = &'a Grid>) -> Grid {
    let mut totals = Grid::default();
    for grid in grids {
        for pos in Grid::cells() {
            let count = totals
                .count(pos.hour, pos.day)
                .saturating_add(grid.count(pos.hour, pos.day));
            let adjusted = totals.is_adjusted(pos.hour, pos.day) || grid.is_adjusted(pos.hour, pos.day);
            totals.set(pos, count, adjusted);
        }
    }
    totals
}

pub fn combine(windows: Vec<WindowGrid>, mode: CombineMode) -> CombinedView {
    match mode {
        CombineMode::Separate => {
            let legend = Legend::from_grids(windows.iter().map(|w| &w.grid));
            CombinedView {
                max_count: legend.max_count,
                legend,
                layout: Layout::Separate { windows },
            }
        }
        CombineMode::Aggregate { sum } => {
            let totals = sum_grids(windows.iter().map(|w| &w.grid));
            let legend = Legend::from_grids([&totals]);
            CombinedView {
                max_count: legend.max_count,
                legend,
                layout: Layout::Aggregate {
                    totals,
                    windows,
                    sum,
                },
            }
        }
    }
}
