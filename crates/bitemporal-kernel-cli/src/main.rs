use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bitemporal_kernel_api::{BitemporalKernelApi, ViewerConfig, ViewerSession};
use bitemporal_kernel_core::{
    parse_instant, Instant, PointerEvent, Projection, RecordId, RenderSink, TemporalDataset,
    TemporalPoint,
};
use bitemporal_kernel_store_sqlite::{HistoryTable, MutationCommand, PresetCommand};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const LOG_ENV: &str = "BK_LOG";

#[derive(Debug, Parser)]
#[command(name = "bk")]
#[command(about = "Bitemporal history viewer CLI")]
struct Cli {
    /// Overrides `db_path` from the config file.
    #[arg(long)]
    db: Option<PathBuf>,

    /// YAML viewer config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pin "now" (YYYY-MM-DD[ HH:MM:SS]) for projections and mutations.
    #[arg(long, value_parser = parse_instant_arg)]
    now: Option<Instant>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// List the canned mutations.
    Presets,
    /// Run one canned mutation and reload every dataset.
    Apply(ApplyArgs),
    /// Run a sequenced update on one entity and reload every dataset.
    Amend(AmendArgs),
    /// Table rows and plane projection of the loaded datasets.
    Show(ShowArgs),
    /// Records in force at an explicit temporal point.
    Match(MatchArgs),
    /// Resolve a pointer position given in plane units.
    Hover(HoverArgs),
    /// Replay refresh and one pointer event through a recording render sink.
    Render(RenderArgs),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    Backup(DbBackupArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    #[arg(value_parser = parse_preset_arg)]
    preset: PresetCommand,
}

#[derive(Debug, Args)]
struct AmendArgs {
    #[arg(long, value_parser = parse_table_arg)]
    table: HistoryTable,
    #[arg(long)]
    entity_id: i64,
    /// `column=value`; the value is read as JSON when it parses, otherwise as text.
    #[arg(long = "set", required = true)]
    set: Vec<String>,
    #[arg(long, value_parser = parse_instant_arg)]
    valid_from: Instant,
}

#[derive(Debug, Args)]
struct ShowArgs {
    #[arg(long, value_parser = parse_table_arg)]
    dataset: Option<HistoryTable>,
}

#[derive(Debug, Args)]
struct MatchArgs {
    #[arg(long, value_parser = parse_instant_arg)]
    transaction: Instant,
    #[arg(long, value_parser = parse_instant_arg)]
    valid: Instant,
}

#[derive(Debug, Args)]
struct HoverArgs {
    #[arg(long, allow_hyphen_values = true, required_unless_present = "leave")]
    x: Option<f64>,
    #[arg(long, allow_hyphen_values = true, required_unless_present = "leave")]
    y: Option<f64>,
    #[arg(long, default_value_t = false, conflicts_with_all = ["x", "y"])]
    leave: bool,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[arg(long, allow_hyphen_values = true, requires = "y")]
    x: Option<f64>,
    #[arg(long, allow_hyphen_values = true, requires = "x")]
    y: Option<f64>,
}

/// Render sink that records every call as JSON.
#[derive(Debug, Default, Serialize)]
struct RecordingSink {
    datasets: Vec<Value>,
    highlights: Vec<Value>,
    cursor: Option<TemporalPoint>,
}

impl RenderSink for RecordingSink {
    fn render_dataset(&mut self, dataset: &TemporalDataset, projection: &Projection) {
        self.datasets.push(serde_json::json!({
            "dataset": dataset.name(),
            "records": dataset.len(),
            "rectangles": projection.rectangles.len(),
            "bounds": projection.bounds,
            "today": projection.today,
        }));
    }

    fn highlight(&mut self, dataset: &str, record_ids: &BTreeSet<RecordId>) {
        self.highlights.push(serde_json::json!({
            "dataset": dataset,
            "record_ids": record_ids,
        }));
    }

    fn cursor(&mut self, point: Option<TemporalPoint>) {
        self.cursor = point;
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref(), cli.db)?;

    match cli.command {
        Command::Db { command } => run_db(command, &BitemporalKernelApi::new(config.db_path)),
        Command::Presets => run_presets(),
        Command::Apply(args) => {
            let mut session = ViewerSession::open_at(config, cli.now)?;
            emit_json(serde_json::to_value(session.apply_preset(args.preset)?)?)
        }
        Command::Amend(args) => run_amend(&args, config, cli.now),
        Command::Show(args) => {
            let session = ViewerSession::open_at(config, cli.now)?;
            emit_json(serde_json::json!({
                "now": bitemporal_kernel_core::format_instant(session.now()),
                "datasets": session.show(args.dataset)
            }))
        }
        Command::Match(args) => {
            let session = ViewerSession::open_at(config, cli.now)?;
            let update = session.match_point(TemporalPoint::new(args.transaction, args.valid));
            emit_json(serde_json::to_value(update)?)
        }
        Command::Hover(args) => run_hover(&args, config, cli.now),
        Command::Render(args) => run_render(&args, config, cli.now),
    }
}

fn resolve_config(path: Option<&Path>, db: Option<PathBuf>) -> Result<ViewerConfig> {
    let mut config = match path {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(db) = db {
        config.db_path = db;
    }
    tracing::debug!(db_path = %config.db_path.display(), "resolved viewer config");
    Ok(config)
}

fn run_db(command: DbCommand, api: &BitemporalKernelApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty(),
                "inferred_from_legacy": status.inferred_from_legacy
            }))
        }
        DbCommand::Migrate(args) => emit_json(serde_json::to_value(api.migrate(args.dry_run)?)?),
        DbCommand::Backup(args) => {
            api.migrate(false)?;
            api.backup(&args.out)?;
            emit_json(serde_json::json!({
                "backup_path": args.out,
                "status": "ok"
            }))
        }
    }
}

fn run_presets() -> Result<()> {
    emit_json(serde_json::json!({ "presets": BitemporalKernelApi::presets() }))
}

fn run_amend(args: &AmendArgs, config: ViewerConfig, now: Option<Instant>) -> Result<()> {
    let mut changes = Map::new();
    for assignment in &args.set {
        let (column, raw) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("--set expects column=value, got `{assignment}`"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        changes.insert(column.trim().to_string(), value);
    }
    let command = MutationCommand::Amend {
        table: args.table,
        entity_id: args.entity_id,
        changes,
        valid_from: args.valid_from,
    };

    let mut session = ViewerSession::open_at(config, now)?;
    emit_json(serde_json::to_value(session.apply(&command)?)?)
}

fn run_hover(args: &HoverArgs, config: ViewerConfig, now: Option<Instant>) -> Result<()> {
    let session = ViewerSession::open_at(config, now)?;
    let view = match (args.leave, args.x, args.y) {
        (true, _, _) => session.leave(),
        (false, Some(x), Some(y)) => session.hover(x, y)?,
        _ => return Err(anyhow!("hover needs --x and --y, or --leave")),
    };
    emit_json(serde_json::to_value(view)?)
}

fn run_render(args: &RenderArgs, config: ViewerConfig, now: Option<Instant>) -> Result<()> {
    let session = ViewerSession::open_at(config, now)?;
    let mut sink = RecordingSink::default();
    session.render(&mut sink);
    let event = match (args.x, args.y) {
        (Some(x), Some(y)) => PointerEvent::Moved { x, y },
        _ => PointerEvent::Left,
    };
    session.dispatch(event, &mut sink)?;
    emit_json(serde_json::to_value(&sink).context("failed to serialize render calls")?)
}

fn parse_instant_arg(raw: &str) -> Result<Instant, String> {
    parse_instant(raw).map_err(|err| err.to_string())
}

fn parse_preset_arg(raw: &str) -> Result<PresetCommand, String> {
    PresetCommand::parse(raw).ok_or_else(|| {
        let known = PresetCommand::ALL.map(PresetCommand::as_str).join(", ");
        format!("unknown preset `{raw}`; expected one of {known}")
    })
}

fn parse_table_arg(raw: &str) -> Result<HistoryTable, String> {
    HistoryTable::parse(raw).ok_or_else(|| {
        let known = HistoryTable::ALL.map(HistoryTable::dataset_name).join(", ");
        format!("unknown dataset `{raw}`; expected one of {known}")
    })
}
