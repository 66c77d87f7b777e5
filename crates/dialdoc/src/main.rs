//! dialdoc - CLI for WAN connection diagnostics
//!
//! Exit codes: 0 overall OK, 1 WARN, 2 FAIL, 3 fatal error.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::info;

use dialdoc::logging::{self, RunLogEntry};
use dialdoc::system::{LinuxAdapters, LinuxHost};
use dialdoc::{
    report, run_full_workflow, run_quick_workflow, toggle, DialdocConfig, ToggleRecordStore,
    WorkflowOptions, WorkflowResult, VERSION,
};
use dialdoc_shared::{HealthStatus, CONFIG_PATH};

const EXIT_FATAL: u8 = 3;

#[derive(Parser)]
#[command(name = "dialdoc")]
#[command(about = "One-shot diagnostics for PPPoE / dial-up WAN connections", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the full result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Append progress lines to this file
    #[arg(long, global = true)]
    transcript: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Local checks: system, adapter, PPP discovery, connectivity
    Quick(CommonArgs),

    /// Quick checks plus dialing, path quality and traceroute
    Full(FullArgs),

    /// Re-enable adapters left disabled by an interrupted run
    Sweep,
}

#[derive(Args)]
struct CommonArgs {
    /// Connection (pppd peer) name
    #[arg(long)]
    pppoe_name: Option<String>,

    /// Adapter to test instead of auto-selection
    #[arg(long)]
    adapter: Option<String>,

    /// Leave Wi-Fi adapters alone
    #[arg(long)]
    skip_wifi_toggle: bool,
}

#[derive(Args)]
struct FullArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Credentials file (key=value, key: value or JSON)
    #[arg(long)]
    credentials_file: Option<PathBuf>,

    /// Run the stability test
    #[arg(long)]
    stability: bool,

    /// Abort when no credentials can be found
    #[arg(long)]
    require_credentials: bool,
}

impl CommonArgs {
    fn apply(&self, options: &mut WorkflowOptions) {
        if let Some(name) = &self.pppoe_name {
            options.pppoe_name = name.clone();
        }
        if let Some(adapter) = &self.adapter {
            options.target_adapter = Some(adapter.clone());
        }
        if self.skip_wifi_toggle {
            options.skip_wifi_toggle = true;
        }
    }
}

impl FullArgs {
    fn apply(&self, options: &mut WorkflowOptions) {
        self.common.apply(options);
        if let Some(user) = &self.user {
            options.user_name = user.clone();
        }
        if let Some(password) = &self.password {
            options.password = password.clone();
        }
        if let Some(path) = &self.credentials_file {
            options.credentials_file_path = Some(path.clone());
        }
        if self.stability {
            options.stability_test = true;
        }
        if self.require_credentials {
            options.require_credentials = true;
        }
    }
}

fn exit_code(status: HealthStatus) -> u8 {
    match status {
        HealthStatus::Ok => 0,
        HealthStatus::Warn => 1,
        HealthStatus::Fail => 2,
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Quick(_) => "quick",
        Commands::Full(_) => "full",
        Commands::Sweep => "sweep",
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    let color = !cli.json && std::io::stdout().is_terminal();
    let start = Instant::now();

    match run(&cli, color) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let mut entry = RunLogEntry::new(command_name(&cli.command), &uuid::Uuid::new_v4().to_string());
            entry.exit_code = i32::from(EXIT_FATAL);
            entry.duration_ms = start.elapsed().as_millis() as u64;
            entry.ok = false;
            entry.error = Some(format!("{:#}", e));
            entry.write();

            report::display_error(&format!("{:#}", e), color);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(cli: &Cli, color: bool) -> Result<u8> {
    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
    let config = DialdocConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if let Commands::Sweep = cli.command {
        return sweep(&config, cli.json);
    }

    let mut options = WorkflowOptions::from_config(&config);
    match &cli.command {
        Commands::Quick(args) => args.apply(&mut options),
        Commands::Full(args) => args.apply(&mut options),
        Commands::Sweep => {}
    }
    if let Some(path) = &cli.transcript {
        let callback = logging::transcript_callback(path)
            .with_context(|| format!("opening transcript {}", path.display()))?;
        options.write_log = Some(callback);
    } else if !cli.json {
        options.write_log = Some(Box::new(|line: &str| -> Result<(), String> {
            eprintln!("  {}", line);
            Ok(())
        }));
    }
    info!("Options: {:?}", options);

    let host = LinuxHost::default();
    let caps = host.capabilities();
    let result: WorkflowResult = match &cli.command {
        Commands::Full(_) => run_full_workflow(&caps, options),
        _ => run_quick_workflow(&caps, options),
    }
    .context("diagnostics aborted")?;

    let code = exit_code(result.overall_status());
    RunLogEntry::from_result(command_name(&cli.command), &result, i32::from(code)).write();

    if cli.json {
        println!("{}", report::render_json(&result)?);
    } else {
        println!("{}", report::render_text(&result, color));
    }
    Ok(code)
}

fn sweep(config: &DialdocConfig, json: bool) -> Result<u8> {
    let store = ToggleRecordStore::new(config.toggle_record_dir());
    let pending = store.load_all().len();
    let restored = toggle::sweep_orphans(&LinuxAdapters, &store);
    let remaining = store.load_all().len();

    let mut entry = RunLogEntry::new("sweep", &uuid::Uuid::new_v4().to_string());
    entry.ok = remaining == 0;
    entry.exit_code = if remaining == 0 { 0 } else { 2 };
    entry.write();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "records": pending,
                "restored": restored,
                "remaining_records": remaining,
            })
        );
    } else if pending == 0 {
        println!("No leftover toggle records in {}", store.dir().display());
    } else {
        println!(
            "Re-enabled {} adapter(s) from {} record(s); {} record(s) remain",
            restored, pending, remaining
        );
    }
    Ok(if remaining == 0 { 0 } else { 2 })
}
