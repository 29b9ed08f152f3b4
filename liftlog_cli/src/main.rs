use clap::{Parser, Subcommand};
use liftlog_core::*;
use serde_json::{json, Value};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "liftlog")]
#[command(about = "Event-sourced strength training log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// User whose log is read or written
    #[arg(long, global = true)]
    user: Option<String>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an event and print it with its derived results
    Emit {
        /// Event type, e.g. WorkoutStarted or SetLogged
        event_type: String,

        /// JSON payload, or "-" to read it from stdin
        payload: String,
    },

    /// Print a projection (current_workout, workout_history, templates,
    /// personal_records, progression_states, exercise_history:<id>)
    Show { key: String },

    /// List recorded events, most recent first
    Events {
        /// Only events of this type
        #[arg(long = "type")]
        event_type: Option<String>,

        /// Maximum number of events to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Rebuild all projections from the event log
    Rebuild,

    /// Export the workout history as CSV, one row per set
    ExportHistory { path: PathBuf },
}

fn main() -> ExitCode {
    liftlog_core::logging::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if let Error::Validation { violations, .. } = &e {
                for violation in violations {
                    eprintln!("  - {}", violation);
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }

    let user = match cli.user.as_deref() {
        Some(raw) => UserId::parse(raw)?,
        None => return Err(Error::invalid(None, "user_id", "--user is required")),
    };
    let engine = Engine::open(config)?;

    match cli.command {
        Commands::Emit {
            event_type,
            payload,
        } => cmd_emit(&engine, &user, &event_type, &payload),
        Commands::Show { key } => cmd_show(&engine, &user, &key),
        Commands::Events { event_type, limit } => {
            cmd_events(&engine, &user, event_type.as_deref(), limit)
        }
        Commands::Rebuild => {
            let report = engine.rebuild(&user)?;
            print_json(&serde_json::to_value(report)?)
        }
        Commands::ExportHistory { path } => cmd_export(&engine, &user, path),
    }
}

type FileEngine = Engine<JsonlEventLog, FileProjectionStore>;

fn print_json(value: &Value) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn cmd_emit(engine: &FileEngine, user: &UserId, event_type: &str, payload: &str) -> Result<()> {
    let event_type: EventType = event_type.parse()?;

    let raw = if payload == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        payload.to_string()
    };
    let payload: Value = serde_json::from_str(&raw).map_err(|e| {
        Error::invalid(Some(event_type), "payload", format!("not valid JSON: {}", e))
    })?;

    let (event, derived) = engine.emit(user, event_type, &payload)?;
    print_json(&json!({
        "event": event,
        "derived": derived,
    }))
}

fn cmd_show(engine: &FileEngine, user: &UserId, key: &str) -> Result<()> {
    let key: ProjectionKey = key.parse()?;
    let document = engine.get_projection(user, &key)?;
    print_json(&document.unwrap_or(Value::Null))
}

fn cmd_events(
    engine: &FileEngine,
    user: &UserId,
    event_type: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let event_type = event_type.map(str::parse::<EventType>).transpose()?;
    let events = engine.events(user, event_type, limit)?;
    print_json(&serde_json::to_value(events)?)
}

fn cmd_export(engine: &FileEngine, user: &UserId, path: PathBuf) -> Result<()> {
    let history: Vec<WorkoutSnapshot> = match engine.get_projection(user, &ProjectionKey::WorkoutHistory)? {
        Some(value) => serde_json::from_value(value)?,
        None => Vec::new(),
    };
    let rows = export_history_csv(&history, &path)?;
    tracing::info!("Exported {} workouts for user {}", history.len(), user);
    print_json(&json!({
        "path": path,
        "workouts": history.len(),
        "rows": rows,
    }))
}
