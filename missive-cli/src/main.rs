mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use missive_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use missive_core::{Config, MessageEngine};
use replay::{build_membership, replay, GroupSpec};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "missive")]
#[command(author, version, about = "Message-state engine tooling", long_about = None)]
struct Args {
    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// TOML configuration file; MISSIVE_* environment variables otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render Prometheus metrics to stderr before exiting
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch JSON-lines events and print the resulting broadcasts
    Replay {
        /// Event file, or `-` for stdin
        file: PathBuf,

        /// Group roster as GROUP=USER[,USER...]; repeatable
        #[arg(long = "group")]
        groups: Vec<GroupSpec>,

        /// Group moderators as GROUP=USER[,USER...]; repeatable
        #[arg(long = "moderator")]
        moderators: Vec<GroupSpec>,

        /// Moderator of every group; repeatable
        #[arg(long = "global-moderator")]
        global_moderators: Vec<String>,

        /// Stop at the first rejected event
        #[arg(long)]
        fail_fast: bool,

        /// Print engine counters as JSON to stderr when done
        #[arg(long)]
        stats: bool,
    },
    /// Write the default configuration to a TOML file
    InitConfig {
        path: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env().context("reading MISSIVE_* environment")?,
    };
    config.validate()?;
    Ok(config)
}

fn open_input(file: &PathBuf) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if file.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = std::fs::File::open(file)
        .with_context(|| format!("opening {}", file.display()))?;
    Ok(Box::new(BufReader::new(tokio::fs::File::from_std(file))))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_ref())?;

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json_format |= args.json_logs;

    let log_config = LogConfig::try_from(&config.logging).unwrap_or_else(|e| {
        eprintln!("{}, using 'info'", e);
        LogConfig::new(LogLevel::Info).json_format(config.logging.json_format)
    });
    init_logging_with_config(log_config)?;

    let prometheus = if args.print_metrics || config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing metrics recorder")?;
        missive_core::metrics::init_metrics();
        Some(handle)
    } else {
        None
    };

    info!("Missive CLI started");

    match args.command {
        Command::Replay {
            file,
            groups,
            moderators,
            global_moderators,
            fail_fast,
            stats,
        } => {
            let membership = build_membership(&groups, &moderators, &global_moderators);
            let engine = MessageEngine::new(&config, Arc::new(membership));
            let input = open_input(&file)?;

            let mut stdout = std::io::stdout().lock();
            let summary = replay(&engine, input, &mut stdout, fail_fast).await?;
            info!(
                applied = summary.applied,
                rejected = summary.rejected,
                "replay finished"
            );

            if stats {
                eprintln!("{}", serde_json::to_string_pretty(&engine.stats())?);
            }
        }
        Command::InitConfig { path } => {
            Config::default().save_to_file(&path)?;
            info!(path = %path.display(), "default configuration written");
        }
    }

    if let Some(handle) = prometheus.filter(|_| args.print_metrics) {
        eprintln!("{}", handle.render());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_written_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missive.toml");
        Config::default().save_to_file(&path).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config, Config::default());

        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_replay_arguments() {
        let args = Args::try_parse_from([
            "missive",
            "--log-level",
            "debug",
            "replay",
            "events.jsonl",
            "--group",
            "g1=s,a",
            "--moderator",
            "g1=mod",
            "--fail-fast",
        ])
        .unwrap();

        assert_eq!(args.log_level.as_deref(), Some("debug"));
        match args.command {
            Command::Replay {
                file,
                groups,
                moderators,
                fail_fast,
                ..
            } => {
                assert_eq!(file, PathBuf::from("events.jsonl"));
                assert_eq!(groups.len(), 1);
                assert_eq!(groups[0].users.len(), 2);
                assert_eq!(moderators[0].group.to_string(), "g1");
                assert!(fail_fast);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
