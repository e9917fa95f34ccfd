use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod daemon;

use config::{DaemonConfig, LoggingConfig};
use daemon::MirrorDaemon;

#[derive(Parser)]
#[command(name = "binsync")]
#[command(about = "Keep a build output directory mirrored into another directory")]
#[command(version)]
struct Cli {
    /// Directory to mirror [default: bin/main]
    #[arg(long = "watchDir", value_name = "PATH")]
    watch_dir: Option<PathBuf>,

    /// Directory holding the mirror [default: build/classes/java/main]
    #[arg(long = "syncDir", value_name = "PATH")]
    sync_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::discover().await?;
    config.apply_cli(cli.watch_dir, cli.sync_dir, cli.debug);

    // Flushes the file log on exit
    let _guard = init_logging(&config.logging, cli.debug)?;

    if let Some(path) = &config.source {
        info!("Loaded configuration from {}", path.display());
    }
    config.validate()?;

    MirrorDaemon::new(config).run().await
}

fn init_logging(logging: &LoggingConfig, debug: bool) -> Result<Option<WorkerGuard>> {
    let level = match logging.level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("binsync={}", level)));
    let filter = with_debug(filter, debug)?;

    let (file_layer, guard) = match &logging.file {
        Some(log_path) => {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }

            let file_appender = rolling::never(
                log_path.parent().unwrap_or_else(|| Path::new(".")),
                log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("binsync.log")),
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// `--debug` wins over whatever `RUST_LOG` says about this crate
fn with_debug(filter: EnvFilter, debug: bool) -> Result<EnvFilter> {
    if !debug {
        return Ok(filter);
    }
    let directive = "binsync=debug"
        .parse()
        .context("Invalid debug log directive")?;
    Ok(filter.add_directive(directive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_camel_case_flags() {
        let cli = Cli::try_parse_from([
            "binsync",
            "--watchDir",
            "out/bin",
            "--syncDir",
            "out/mirror",
            "--debug",
        ])
        .unwrap();

        assert_eq!(cli.watch_dir, Some(PathBuf::from("out/bin")));
        assert_eq!(cli.sync_dir, Some(PathBuf::from("out/mirror")));
        assert!(cli.debug);
    }

    #[test]
    fn test_flags_are_optional() {
        let cli = Cli::try_parse_from(["binsync"]).unwrap();

        assert!(cli.watch_dir.is_none());
        assert!(cli.sync_dir.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn test_debug_flag_overrides_env_filter() {
        let filter = with_debug(EnvFilter::new("binsync=warn"), true).unwrap();
        let rendered = filter.to_string();

        assert!(rendered.contains("binsync=debug"), "{}", rendered);
        assert!(!rendered.contains("binsync=warn"), "{}", rendered);
    }

    #[test]
    fn test_env_filter_kept_without_debug_flag() {
        let filter = with_debug(EnvFilter::new("binsync=warn"), false).unwrap();

        assert_eq!(filter.to_string(), "binsync=warn");
    }

    #[test]
    fn test_no_other_flags() {
        assert!(Cli::try_parse_from(["binsync", "--config", "x.toml"]).is_err());
    }
}
