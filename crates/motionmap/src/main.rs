mod config;
mod db;
mod demo;
mod ingest;
mod render;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use motionmap_engine::details::CellSelector;
use motionmap_engine::range::{min_week_offset, DataBounds};
use motionmap_engine::view::offset_of_latest;
use motionmap_engine::{
    ActivityStore, EditSession, HeatmapView, NaiveTimestampPolicy, ReconcileContext, SensorSelection,
    SessionOutcome, Snapshot, WeekSpan,
};

use crate::config::{watch_interval, Cli, Command, DemoAction, ExportFormat, SlotArgs, ViewArgs};
use crate::db::Database;

const WATCH_TICK: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let policy = NaiveTimestampPolicy::from(cli.naive_timestamps);
    let mut db = Database::open(&cli.db)?;

    match cli.command {
        Command::Sensors => {
            print!("{}", render::render_sensors(&db.list_sensors()?));
        }
        Command::Hide { id, show } => {
            db.set_sensor_hidden(id, !show)?;
        }
        Command::Heatmap { view, color } => {
            let snapshot = Snapshot::load(&db, policy)?;
            let selection = view.selection(&snapshot.sensors)?;
            let heatmap = build_view(&view, selection, &snapshot, Utc::now())?;
            print!("{}", render::render_heatmap(&heatmap, color));
        }
        Command::Cell {
            view,
            day,
            hour,
            date,
        } => {
            let snapshot = Snapshot::load(&db, policy)?;
            let selection = view.selection(&snapshot.sensors)?;
            let heatmap = build_view(&view, selection, &snapshot, Utc::now())?;
            let selector = CellSelector {
                day: usize::from(day),
                hour: u32::from(hour),
                date,
            };
            print!("{}", render::render_details(&heatmap.cell_details(&Local, selector)));
        }
        Command::Watch {
            view,
            color,
            interval_secs,
        } => {
            let interval = watch_interval(interval_secs)?;
            run_watch(&db, policy, &view, color, interval)?;
        }
        Command::Export {
            view,
            format,
            output,
        } => {
            let snapshot = Snapshot::load(&db, policy)?;
            let selection = view.selection(&snapshot.sensors)?;
            let heatmap = build_view(&view, selection, &snapshot, Utc::now())?;
            let writer: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
                    format!("failed to create export file: {}", path.display())
                })?)),
                None => Box::new(io::stdout().lock()),
            };
            write_export(&heatmap, format, writer)?;
            if let Some(path) = output {
                info!(path = %path.display(), "exported view");
            }
        }
        Command::Slot(slot) => {
            let snapshot = Snapshot::load(&db, policy)?;
            let mut session = EditSession::new();
            open_slot(&mut session, &snapshot, &slot)?;
        }
        Command::Adjust {
            slot,
            total,
            comment,
        } => {
            let snapshot = Snapshot::load(&db, policy)?;
            let mut session = EditSession::new();
            open_slot(&mut session, &snapshot, &slot)?;
            let outcome = session.save(&mut db, total, &comment)?;
            report_outcome(&outcome);
            show_slot(&db, policy, &slot)?;
        }
        Command::Clear { slot, yes } => {
            let snapshot = Snapshot::load(&db, policy)?;
            let mut session = EditSession::new();
            open_slot(&mut session, &snapshot, &slot)?;
            let outcome = session.clear(&mut db, yes)?;
            report_outcome(&outcome);
            show_slot(&db, policy, &slot)?;
        }
        Command::Import { path } => {
            let stats = ingest::import_csv_file(&mut db, &path)?;
            println!(
                "Imported {} of {} rows ({} skipped)",
                stats.imported_rows, stats.total_rows, stats.skipped_rows
            );
        }
        Command::Demo { action } => match action {
            DemoAction::Generate => {
                let stats = demo::generate_demo(&mut db, &Local, Local::now().date_naive())?;
                println!(
                    "Generated {} events for {} demo sensors",
                    stats.events, stats.sensors
                );
            }
            DemoAction::Clear => {
                let stats = demo::clear_demo(&mut db)?;
                println!(
                    "Removed {} demo sensors, {} events, {} adjustments",
                    stats.sensors, stats.events, stats.adjustments
                );
            }
        },
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn build_view(
    args: &ViewArgs,
    selection: SensorSelection,
    snapshot: &Snapshot,
    now: DateTime<Utc>,
) -> Result<HeatmapView> {
    let mut params = args.to_params(selection)?;

    if args.latest {
        if let Some(offset) = offset_of_latest(&Local, now, snapshot) {
            // The newest week ends the range.
            let extra = i64::from(params.span.weeks().saturating_sub(1));
            params.week_offset = offset - extra;
        }
    }

    if params.span != WeekSpan::AllTime {
        let floor = min_week_offset(now, DataBounds::from_events(&snapshot.events, now).min);
        if params.week_offset < floor {
            warn!(
                requested = params.week_offset,
                floor, "week offset is before the earliest data; clamping"
            );
            params.week_offset = floor;
        }
    }

    Ok(HeatmapView::compute(&Local, now, snapshot, &params))
}

fn write_export(heatmap: &HeatmapView, format: ExportFormat, mut writer: impl Write) -> Result<()> {
    match format {
        ExportFormat::Csv => render::write_csv(heatmap, &mut writer)?,
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &render::export_json(heatmap))
                .context("failed to write JSON export")?;
            writeln!(writer).context("failed to write JSON export")?;
        }
    }
    writer.flush().context("failed to flush export")
}

fn run_watch(
    db: &Database,
    policy: NaiveTimestampPolicy,
    view: &ViewArgs,
    color: bool,
    interval: Duration,
) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = Arc::clone(&shutdown);
    if let Err(err) = ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::SeqCst);
    }) {
        warn!("ctrlc handler registration warning: {err}");
    }

    let mut snapshot = Snapshot::load(db, policy)?;
    let mut selection = view.selection(&snapshot.sensors)?;
    info!(interval_secs = interval.as_secs(), "watching");

    loop {
        match build_view(view, selection.clone(), &snapshot, Utc::now()) {
            Ok(heatmap) => {
                print!("\x1b[2J\x1b[H{}", render::render_heatmap(&heatmap, color));
                let _ = io::stdout().flush();
            }
            Err(err) => warn!("view error: {err:#}"),
        }

        let deadline = Instant::now() + interval;
        while Instant::now() < deadline && !shutdown.load(Ordering::Relaxed) {
            thread::sleep(WATCH_TICK);
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        // A failed read keeps the previous snapshot on screen.
        if snapshot.refresh(db, policy).is_ok() {
            selection.prune(&snapshot.sensors);
        }
    }

    info!("watch stopped");
    Ok(())
}

fn open_slot(session: &mut EditSession, snapshot: &Snapshot, slot: &SlotArgs) -> Result<()> {
    let selection = slot.selection(&snapshot.sensors)?;
    let ctx = ReconcileContext {
        events: &snapshot.events,
        adjustments: &snapshot.adjustments,
        sensors: &snapshot.sensors,
        selection: &selection,
    };
    let target = session.open(&Local, slot.instant()?, &ctx)?;
    print!("{}", render::render_target(&Local, target));
    Ok(())
}

fn show_slot(db: &Database, policy: NaiveTimestampPolicy, slot: &SlotArgs) -> Result<()> {
    let snapshot = Snapshot::load(db, policy)?;
    open_slot(&mut EditSession::new(), &snapshot, slot)
}

fn report_outcome(outcome: &SessionOutcome) {
    match outcome {
        SessionOutcome::Saved { plan, inserted } => println!(
            "Saved: replaced {} record(s) with adjustment {:+}",
            plan.deletes.len(),
            inserted.as_ref().map_or(0, |a| a.value)
        ),
        SessionOutcome::Cleared { plan } => {
            println!("Cleared {} record(s)", plan.deletes.len())
        }
        SessionOutcome::Cancelled => println!("Cancelled"),
    }
}
