//! lamco-hidpi-daemon - HiDPI display reconciliation for X11 sessions
//!
//! Entry point for the daemon binary.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lamco_hidpi_daemon::config::Config;
use lamco_hidpi_daemon::daemon::Daemon;

/// Command-line arguments for lamco-hidpi-daemon
#[derive(Parser, Debug)]
#[command(name = "lamco-hidpi-daemon")]
#[command(version, about = "HiDPI display reconciliation daemon", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "HIDPI_CONFIG",
        default_value = "/etc/lamco-hidpi-daemon/config.toml"
    )]
    pub config: String,

    /// X display (defaults to $DISPLAY)
    #[arg(short, long)]
    pub display: Option<String>,

    /// GPU vendor override (auto|intel|nvidia)
    #[arg(long, env = "HIDPI_VENDOR")]
    pub vendor: Option<String>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Print the plan for the current topology as JSON and exit
    #[arg(long)]
    pub print_plan: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config first: it names the log directory
    let loaded = Config::load(&args.config);
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default_config()?,
    };

    let _guard = init_logging(&args, &config)?;

    info!("════════════════════════════════════════════════════════");
    info!(
        "  lamco-hidpi-daemon v{}",
        lamco_hidpi_daemon::utils::build_stamp()
    );
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    if let Err(e) = loaded {
        tracing::warn!("Failed to load config: {:#}, using defaults", e);
    }

    lamco_hidpi_daemon::utils::log_startup_diagnostics();

    let config = config.with_overrides(args.display.clone(), args.vendor.clone());
    if let Err(e) = config.validate() {
        eprintln!("{}", lamco_hidpi_daemon::utils::format_user_error(&e));
        return Err(e);
    }

    info!("Configuration loaded successfully");
    tracing::debug!("Config: {:?}", config);

    let daemon = Daemon::new(config);

    if args.print_plan {
        let preview = match daemon.preview() {
            Ok(preview) => preview,
            Err(e) => {
                eprintln!("{}", lamco_hidpi_daemon::utils::format_user_error(&e));
                return Err(e);
            }
        };
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    info!("Starting daemon");
    if let Err(e) = daemon.run().await {
        eprintln!("{}", lamco_hidpi_daemon::utils::format_user_error(&e));
        return Err(e);
    }

    info!("Daemon shut down");
    Ok(())
}

fn init_logging(args: &Args, config: &Config) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // zbus logs every message at debug
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_hidpi_daemon={level},zbus=info,warn",
            level = log_level
        ))
    });

    // --log-file wins over the configured rolling directory
    let (file, guard, target) = if let Some(path) = &args.log_file {
        let (writer, guard) = tracing_appender::non_blocking(std::fs::File::create(path)?);
        (Some(writer), Some(guard), Some(path.clone()))
    } else if let Some(dir) = &config.logging.log_dir {
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::daily(dir, "lamco-hidpi-daemon.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(writer), Some(guard), Some(dir.display().to_string()))
    } else {
        (None, None, None)
    };

    match args.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .with(file.map(|w| {
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(w)
                        .with_ansi(false)
                }))
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .with(file.map(|w| {
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(w)
                        .with_ansi(false)
                }))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .with(file.map(|w| {
                    tracing_subscriber::fmt::layer()
                        .with_writer(w)
                        .with_ansi(false)
                }))
                .init();
        }
    }

    if let Some(target) = target {
        info!("Logging to file: {}", target);
    }

    Ok(guard)
}
