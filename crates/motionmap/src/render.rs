use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::io::Write;

use motionmap_engine::calendar::{DAYS_PER_WEEK, DAY_NAMES, HOURS_PER_DAY};
use motionmap_engine::details::CellDetails;
use motionmap_engine::model::Sensor;
use motionmap_engine::palette::{cell_shade, legend_gradient};
use motionmap_engine::{AdjustmentTarget, CombinedView, Grid, HeatmapView, Layout, SubCell};

const CELL_WIDTH: usize = 6;

pub fn render_heatmap(view: &HeatmapView, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", view.range_label);

    let max = view.combined.max_count;
    match &view.combined.layout {
        Layout::Separate { windows } => {
            for window in windows {
                let _ = writeln!(out, "\n{}", window.window.label);
                render_grid(&mut out, &window.grid, max, color, |_, _| None);
            }
        }
        Layout::Aggregate { totals, windows, sum } => {
            let _ = writeln!(out, "\nCombined over {} week(s)", windows.len());
            let combined = &view.combined;
            render_grid(&mut out, totals, max, color, |hour, day| {
                if *sum {
                    None
                } else {
                    combined.sub_cells(hour, day)
                }
            });
        }
    }

    let _ = writeln!(out, "\n{}", render_legend(&view.combined));
    out
}

fn render_grid(
    out: &mut String,
    grid: &Grid,
    max: u32,
    color: bool,
    sub_cells: impl Fn(usize, usize) -> Option<Vec<SubCell>>,
) {
    let width = (0..HOURS_PER_DAY)
        .flat_map(|hour| (0..DAYS_PER_WEEK).map(move |day| (hour, day)))
        .map(|(hour, day)| cell_text(grid, hour, day, sub_cells(hour, day)).len())
        .max()
        .unwrap_or(0)
        .max(CELL_WIDTH);

    let _ = write!(out, "     ");
    for name in DAY_NAMES {
        let _ = write!(out, " {name:>width$}");
    }
    out.push('\n');

    for hour in 0..HOURS_PER_DAY {
        let _ = write!(out, "{hour:02}:00");
        for day in 0..DAYS_PER_WEEK {
            let text = cell_text(grid, hour, day, sub_cells(hour, day));
            let padded = format!("{text:>width$}");
            out.push(' ');
            if color {
                let shade = cell_shade(grid.count(hour, day), max);
                let (r, g, b) = shade.rgb();
                let fg = if shade.light_text() { "97" } else { "30" };
                let _ = write!(out, "\x1b[48;2;{r};{g};{b}m\x1b[{fg}m{padded}\x1b[0m");
            } else {
                out.push_str(&padded);
            }
        }
        out.push('\n');
    }
}

// Adjusted values carry a trailing `*`, per window when sub-cells are shown.
fn cell_text(grid: &Grid, hour: usize, day: usize, sub_cells: Option<Vec<SubCell>>) -> String {
    match sub_cells {
        Some(cells) => cells
            .iter()
            .map(|cell| marked(cell.count, cell.adjusted))
            .collect::<Vec<_>>()
            .join("/"),
        None => marked(grid.count(hour, day), grid.is_adjusted(hour, day)),
    }
}

fn marked(count: u32, adjusted: bool) -> String {
    if adjusted {
        format!("{count}*")
    } else {
        count.to_string()
    }
}

pub fn render_legend(combined: &CombinedView) -> String {
    if combined.max_count == 0 {
        return "Legend: no activity".to_owned();
    }
    let ticks: Vec<String> = combined
        .legend
        .ticks()
        .iter()
        .map(|tick| format!("{}@{:.0}%", tick.value, tick.position))
        .collect();
    format!(
        "Legend: 0..{} | values {} | * = adjusted",
        combined.max_count,
        ticks.join(" ")
    )
}

pub fn render_sensors(sensors: &[Sensor]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>4}  {:<24} {:<8} {:<28} hidden", "id", "unique_id", "type", "name");
    for sensor in sensors {
        let _ = writeln!(
            out,
            "{:>4}  {:<24} {:<8} {:<28} {}",
            sensor.id,
            sensor.unique_id,
            sensor.kind,
            sensor.name,
            if sensor.is_hidden { "yes" } else { "no" }
        );
    }
    out
}

pub fn render_target<Tz: TimeZone>(tz: &Tz, target: &AdjustmentTarget) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    let local = target.slot.with_timezone(tz);
    let _ = writeln!(out, "Sensor {} at {}", target.sensor_id, local.format("%a %Y-%m-%d %H:00 %:z"));
    let _ = writeln!(out, "  raw count:      {}", target.raw_count);
    let _ = writeln!(out, "  net adjustment: {:+}", target.net_adjustment);
    let _ = writeln!(out, "  current total:  {}", target.current_total);
    for adjustment in &target.existing {
        let _ = writeln!(
            out,
            "  #{} {:+} \"{}\"",
            adjustment.id, adjustment.value, adjustment.comment
        );
    }
    out
}

pub fn render_details(details: &CellDetails) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} event(s) on {} date(s)",
        details.events.len(),
        details.dates.len()
    );
    for event in &details.events {
        let local = event.timestamp.with_timezone(&Local);
        let _ = writeln!(
            out,
            "  {} sensor {} #{}",
            local.format("%Y-%m-%d %H:%M:%S"),
            event.sensor_id,
            event.id
        );
    }
    out
}

pub fn write_csv(view: &HeatmapView, writer: impl Write) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["window", "start", "day", "day_name", "hour", "count", "adjusted"])
        .context("failed to write CSV header")?;

    let mut rows: Vec<(String, String, &Grid)> = view
        .combined
        .windows()
        .iter()
        .map(|w| (w.window.label.clone(), w.window.start.to_rfc3339(), &w.grid))
        .collect();
    if let Some(totals) = view.combined.totals() {
        rows.push(("combined".to_owned(), String::new(), totals));
    }

    for (label, start, grid) in rows {
        for day in 0..DAYS_PER_WEEK {
            for hour in 0..HOURS_PER_DAY {
                let day_text = day.to_string();
                let hour_text = hour.to_string();
                let count_text = grid.count(hour, day).to_string();
                csv.write_record([
                    label.as_str(),
                    start.as_str(),
                    day_text.as_str(),
                    DAY_NAMES[day],
                    hour_text.as_str(),
                    count_text.as_str(),
                    if grid.is_adjusted(hour, day) { "true" } else { "false" },
                ])
                .context("failed to write CSV row")?;
            }
        }
    }
    csv.flush().context("failed to flush CSV writer")?;
    Ok(())
}

pub fn export_json(view: &HeatmapView) -> Value {
    let grid_json = |grid: &Grid| {
        let adjusted: Vec<Vec<bool>> = (0..HOURS_PER_DAY)
            .map(|hour| (0..DAYS_PER_WEEK).map(|day| grid.is_adjusted(hour, day)).collect())
            .collect();
        json!({ "counts": grid.counts(), "adjusted": adjusted })
    };

    let windows: Vec<Value> = view
        .combined
        .windows()
        .iter()
        .map(|w| {
            json!({
                "label": w.window.label,
                "start": w.window.start.to_rfc3339(),
                "end": w.window.end.to_rfc3339(),
                "grid": grid_json(&w.grid),
            })
        })
        .collect();

    let gradient: Vec<String> = legend_gradient().iter().map(|stop| stop.css()).collect();
    let mode = match view.combined.layout {
        Layout::Separate { .. } => "separate",
        Layout::Aggregate { sum: true, .. } => "aggregate-sum",
        Layout::Aggregate { sum: false, .. } => "aggregate",
    };

    json!({
        "range_label": view.range_label,
        "mode": mode,
        "max_count": view.combined.max_count,
        "min_week_offset": view.min_week_offset,
        "windows": windows,
        "totals": view.combined.totals().map(grid_json),
        "legend": {
            "values": view.combined.legend.values,
            "ticks": view.combined.legend.ticks(),
            "gradient": gradient,
        },
    })
}
