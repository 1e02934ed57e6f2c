//! herakles-proc-load-monitor
//!
//! Command-line front end for the process load monitor: watches or samples
//! CPU load and memory usage of this process, reports platform support and
//! generates configuration files.

mod cli;
mod commands;

use clap::Parser;
use tracing::{info, Level};

use herakles_proc_load_monitor::{load_config, validate_effective_config, Config, ConfigFormat};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_sample, command_watch};

/// Loads the config file (unless disabled) and applies CLI overrides.
/// Precedence: CLI > config file > defaults.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(mode) = args.mode {
        config.mode = Some(mode);
    }
    if let Some(ms) = args.interval_ms {
        config.refresh_interval_ms = Some(ms);
    }
    if let Some(ms) = args.threshold_ms {
        config.refresh_threshold_ms = Some(ms);
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(level) = args.log_level {
        config.log_level = Some(format!("{level:?}").to_lowercase());
    }

    Ok(config)
}

/// Shows configuration in requested format
fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    println!("{}", config.render(format)?.trim_end());
    Ok(())
}

/// Initializes tracing logging subsystem with the effective log level.
/// Logs go to stderr so stdout only carries records.
fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let log_level = match LogLevel::from_config(config.log_level()) {
        Some(LogLevel::Off) => return Ok(()),
        Some(LogLevel::Error) => Level::ERROR,
        Some(LogLevel::Warn) => Level::WARN,
        Some(LogLevel::Info) | None => Level::INFO,
        Some(LogLevel::Debug) => Level::DEBUG,
        Some(LogLevel::Trace) => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {}", config.log_level());
    Ok(())
}

// -------------------------------------------------------------------
// MAIN APPLICATION ENTRY POINT
// -------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Config generation needs no effective config
    if let Some(Commands::Config {
        output,
        format,
        commented,
    }) = &args.command
    {
        return command_config(output.clone(), *format, *commented);
    }

    let config = resolve_config(&args)?;

    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        return show_config(&config, args.config_format);
    }

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config)?;

    match args.command {
        Some(Commands::Watch {
            duration_secs,
            format,
        }) => command_watch(&config, duration_secs, format).await,
        Some(Commands::Sample { iterations, format }) => {
            command_sample(&config, iterations, format)
        }
        Some(Commands::Check { format }) => command_check(&config, format),
        Some(Commands::Config { .. }) => Ok(()),
        None => {
            info!("Starting herakles-proc-load-monitor");
            command_watch(&config, None, ConfigFormat::Json).await
        }
    }
}
