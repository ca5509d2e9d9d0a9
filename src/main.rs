use clap::Parser;
use crossbeam_channel::bounded;
use cursor_chat_monitor::config::{
    self, BootstrapMode, DEFAULT_KEY_PREFIX, DEFAULT_POLL_INTERVAL_SECS, MonitorConfig,
};
use cursor_chat_monitor::logging;
use cursor_chat_monitor::monitor::Monitor;
use cursor_chat_monitor::render;
use cursor_chat_monitor::sink::{self, Output, Sink};
use cursor_chat_monitor::store::{DEFAULT_TABLE, ReadMode, SqliteStore};
use eyre::{Context, Result, eyre};
use std::path::PathBuf;

/// Print new and updated Cursor chat conversations as they appear.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to Cursor's state database (state.vscdb).
    /// Auto-detected if omitted.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/cursor-chat-monitor/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Key-value table to read.
    #[arg(long, value_name = "NAME")]
    table: Option<String>,

    /// Only keys starting with this prefix are monitored.
    #[arg(long, value_name = "PREFIX")]
    prefix: Option<String>,

    /// Seconds to sleep between polls.
    #[arg(short, long, value_name = "SECS")]
    interval: Option<f64>,

    /// What the first poll does with conversations that already exist.
    /// [default: skip-existing]
    #[arg(long, value_enum)]
    bootstrap: Option<BootstrapMode>,

    /// Also append the transcript to this file.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Read from a backup copy of the database instead of the live file.
    #[arg(long)]
    snapshot: bool,

    /// Run a single poll and exit.
    #[arg(long)]
    once: bool,

    /// Print the database's tables, columns and row counts, then exit.
    #[arg(long)]
    info: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = config::load_file_config(cli.config.as_deref())?;

    let debug = cli.debug || file_cfg.debug.unwrap_or(false);
    logging::init(debug);

    // 2. Resolve db_path (CLI > Config > Auto-detect)
    let db_path = cli
        .db
        .or(file_cfg.db_path)
        .or_else(config::default_db_path)
        .ok_or_else(|| {
            eyre!("Could not determine database path.\nUse --db to specify manually, or set db_path in config.toml.")
        })?;

    if !db_path.exists() {
        return Err(eyre!(
            "Database not found at: {}\nUse --db to specify the path manually.",
            db_path.display()
        ));
    }

    // 3. Resolve the remaining settings (CLI > Config > Default)
    let table = cli
        .table
        .or(file_cfg.table)
        .unwrap_or_else(|| DEFAULT_TABLE.to_string());
    let mode = if cli.snapshot {
        ReadMode::Snapshot
    } else {
        ReadMode::Direct
    };
    let store = SqliteStore::new(db_path, &table, mode)?;

    if cli.info {
        let info = store.describe().wrap_err("Failed to inspect database")?;
        print!("{}", render::render_database_info(&info));
        return Ok(());
    }

    let monitor_cfg = MonitorConfig {
        key_prefix: cli
            .prefix
            .or(file_cfg.key_prefix)
            .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
        poll_interval: config::poll_interval(
            cli.interval
                .or(file_cfg.poll_interval_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        )?,
        bootstrap_mode: cli.bootstrap.or(file_cfg.bootstrap).unwrap_or_default(),
        debug_logging: debug,
    };

    // 4. Open the output sinks
    let mut output = Output::new().with(sink::console());
    if let Some(path) = cli.output.or(file_cfg.output) {
        let mut file = sink::append_file(&path)?;
        file.emit(&format!(
            "\n\n=== MONITORING STARTED AT {} ===\n\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ))
        .wrap_err_with(|| format!("Failed to write output file: {}", path.display()))?;
        output = output.with(file);
    }

    tracing::info!(db = %store.path().display(), table = %table, "watching Cursor chats");
    let mut monitor = Monitor::new(monitor_cfg, store, output);

    // 5. Run
    if cli.once {
        monitor.run_cycle();
        monitor.finish();
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .wrap_err("Failed to install Ctrl-C handler")?;

    monitor.run(&shutdown_rx);
    Ok(())
}
