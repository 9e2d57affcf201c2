use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use motionmap_engine::calendar::local_instant;
use motionmap_engine::model::{Sensor, SensorId};
use motionmap_engine::timestamp::require_explicit_offset;
use motionmap_engine::{
    CombineMode, FilterOptions, NaiveTimestampPolicy, SensorSelection, ViewParams, WeekSpan,
};

const LOCAL_SLOT_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Parser, Debug)]
#[command(name = "motionmap", version, about = "Weekly sensor activity heatmaps with manual corrections")]
pub struct Cli {
    /// SQLite file path (default: %LOCALAPPDATA%\MotionMap\motionmap.db)
    #[arg(long, global = true, env = "MOTIONMAP_DB", default_value_os_t = default_db_path())]
    pub db: PathBuf,

    /// How stored timestamps without a UTC offset are read
    #[arg(long, global = true, value_enum, default_value_t = NaivePolicyArg::AssumeUtc)]
    pub naive_timestamps: NaivePolicyArg,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List known sensors
    Sensors,
    /// Set or clear a sensor's hidden flag
    Hide {
        id: SensorId,
        #[arg(long)]
        show: bool,
    },
    /// Print the heatmap for the current view
    Heatmap {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long)]
        color: bool,
    },
    /// List the events behind one cell
    Cell {
        #[command(flatten)]
        view: ViewArgs,
        /// Weekday, 0 = Sunday
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..7))]
        day: u8,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..24))]
        hour: u8,
        /// Restrict to one calendar date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },
    /// Redraw the heatmap on a fixed interval until Ctrl-C
    Watch {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long)]
        color: bool,
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
    },
    /// Write the current view as CSV or JSON
    Export {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the editable state of one sensor hour
    Slot(SlotArgs),
    /// Replace a sensor hour's count with a corrected total
    Adjust {
        #[command(flatten)]
        slot: SlotArgs,
        #[arg(long)]
        total: i64,
        #[arg(long)]
        comment: String,
    },
    /// Remove every correction of a sensor hour
    Clear {
        #[command(flatten)]
        slot: SlotArgs,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Import events from a CSV file with sensor, timestamp and value columns
    Import { path: PathBuf },
    /// Generate or remove demo sensors and events
    Demo {
        #[command(subcommand)]
        action: DemoAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum DemoAction {
    Generate,
    Clear,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaivePolicyArg {
    AssumeUtc,
    Reject,
}

impl From<NaivePolicyArg> for NaiveTimestampPolicy {
    fn from(value: NaivePolicyArg) -> Self {
        match value {
            NaivePolicyArg::AssumeUtc => Self::AssumeUtc,
            NaivePolicyArg::Reject => Self::Reject,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    /// Weeks relative to the current one (negative = past)
    #[arg(long, allow_negative_numbers = true, conflicts_with = "latest")]
    pub week_offset: Option<i64>,
    /// Number of weeks to show, 0 for all time
    #[arg(long, default_value_t = 1)]
    pub weeks: u32,
    /// Start at the week holding the newest event
    #[arg(long)]
    pub latest: bool,
    /// Sensor ids to include (repeatable; default: every sensor)
    #[arg(long = "sensor")]
    pub sensors: Vec<SensorId>,
    /// Overlay all windows into one grid
    #[arg(long)]
    pub aggregate: bool,
    /// With --aggregate, show only the summed totals
    #[arg(long, requires = "aggregate")]
    pub sum: bool,
    #[arg(long)]
    pub include_today: bool,
    #[arg(long)]
    pub include_first_day: bool,
}

impl ViewArgs {
    /// Validates everything except the offset, which may depend on the data.
    pub fn to_params(&self, selection: SensorSelection) -> Result<ViewParams> {
        let span = WeekSpan::from_weeks(self.weeks).context("invalid --weeks")?;
        let mode = if self.aggregate {
            CombineMode::Aggregate { sum: self.sum }
        } else {
            CombineMode::Separate
        };
        Ok(ViewParams {
            week_offset: self.week_offset.unwrap_or(0),
            span,
            mode,
            filters: FilterOptions {
                exclude_today: !self.include_today,
                exclude_first_day: !self.include_first_day,
            },
            selection,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct SlotArgs {
    /// Any instant inside the hour: RFC 3339, or local "YYYY-MM-DD HH:MM"
    #[arg(long)]
    pub at: String,
    /// Sensor to correct (default: the only sensor)
    #[arg(long = "sensor")]
    pub sensors: Vec<SensorId>,
}

impl ViewArgs {
    pub fn selection(&self, sensors: &[Sensor]) -> Result<SensorSelection> {
        select_sensors(&self.sensors, sensors)
    }
}

impl SlotArgs {
    pub fn instant(&self) -> Result<DateTime<Utc>> {
        parse_slot_instant(&self.at)
    }

    pub fn selection(&self, sensors: &[Sensor]) -> Result<SensorSelection> {
        select_sensors(&self.sensors, sensors)
    }
}

pub fn select_sensors(requested: &[SensorId], sensors: &[Sensor]) -> Result<SensorSelection> {
    if requested.is_empty() {
        return Ok(SensorSelection::all(sensors));
    }
    for id in requested {
        if !sensors.iter().any(|s| s.id == *id) {
            bail!("unknown sensor id: {id}");
        }
    }
    Ok(SensorSelection::from_ids(requested.iter().copied()))
}

pub fn parse_slot_instant(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("--at cannot be empty");
    }
    if let Ok(at) = require_explicit_offset(trimmed) {
        return Ok(at);
    }
    for format in LOCAL_SLOT_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(local_instant(&Local, naive));
        }
    }
    bail!("invalid --at value: {value}")
}

pub fn watch_interval(secs: u64) -> Result<Duration> {
    if secs == 0 {
        bail!("--interval-secs must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

fn default_db_path() -> PathBuf {
    if let Some(local) = env::var_os("LOCALAPPDATA") {
        return PathBuf::from(local).join("MotionMap").join("motionmap.db");
    }
    PathBuf::from("data").join("motionmap.db")
}
