mod config;
mod crm_file;
mod imap;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use crm_mail_core::{AssetStore, Directory, HandlerRegistry, MailProcessor, OperatorLog};
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, DaemonConfig};
use crate::crm_file::CrmFile;
use crate::imap::ImapStore;

const LOG_FILE: &str = "crm-mail.log";

const USAGE: &str = "usage: crm-mail-daemon [--config PATH] setup|run|watch";

// ── Logging ─────────────────────────────────────────────────────────────────

fn setup_logging(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let _ = fs::create_dir_all(log_dir);

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking.and(std::io::stdout))
        .with_ansi(false)
        .with_target(true)
        .init();

    info!("Logging initialized. Log directory: {:?}", log_dir);

    guard
}

fn cleanup_old_logs(log_dir: &Path) {
    let max_age_days = 7;
    let max_size_bytes: u64 = 5 * 1024 * 1024;

    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        // Rotated files are named crm-mail.log.YYYY-MM-DD
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE));
        if !is_log {
            continue;
        }
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };

        let too_old = metadata
            .modified()
            .ok()
            .and_then(|m| std::time::SystemTime::now().duration_since(m).ok())
            .is_some_and(|age| age.as_secs() > max_age_days * 24 * 60 * 60);
        if too_old {
            info!("Removing old log file: {:?}", path);
            let _ = fs::remove_file(&path);
        } else if metadata.len() > max_size_bytes {
            info!(
                "Removing oversized log file: {:?} ({}MB)",
                path,
                metadata.len() / 1024 / 1024
            );
            let _ = fs::remove_file(&path);
        }
    }
}

// ── Command line ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Setup,
    Run,
    Watch,
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args, String> {
    let mut config = None;
    let mut command = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "setup" | "run" | "watch" if command.is_some() => {
                return Err(format!("unexpected extra command '{}'", arg));
            }
            "setup" => command = Some(Command::Setup),
            "run" => command = Some(Command::Run),
            "watch" => command = Some(Command::Watch),
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }

    let command = command.ok_or("missing command")?;
    Ok(Args { config, command })
}

// ── Main ────────────────────────────────────────────────────────────────────

fn load_config(args: &Args) -> Result<DaemonConfig, ConfigError> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => DaemonConfig::default_path()?,
    };
    DaemonConfig::load(&path)
}

fn build_processor(
    config: &DaemonConfig,
) -> Result<MailProcessor<ImapStore>, ConfigError> {
    let crm = Arc::new(CrmFile::open(&config.data_file)?);
    info!("Using CRM data file {:?}", crm.path());

    let assets: Arc<dyn AssetStore> = crm.clone();
    let directory: Arc<dyn Directory> = crm;

    let registry = HandlerRegistry::from_keywords(config.handlers.as_slice(), assets)?;
    info!("Enabled handlers: {:?}", registry.kinds());

    Ok(MailProcessor::new(
        ImapStore::new(),
        config.imap.clone(),
        directory,
        Box::new(registry),
        OperatorLog::new(config.processor_name.clone(), config.quiet),
    ))
}

#[async_std::main]
async fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            return ExitCode::FAILURE;
        }
    };

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_dir = config.log_dir();
    cleanup_old_logs(&log_dir);
    let _guard = setup_logging(&log_dir);

    info!("Starting crm-mail-daemon ({:?})", args.command);

    let mut processor = match build_processor(&config) {
        Ok(processor) => processor,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Command::Setup => match processor.setup().await {
            Some(report) => {
                info!(
                    "Setup finished: {} existing, {} created",
                    report.existing.len(),
                    report.created.len()
                );
                ExitCode::SUCCESS
            }
            None => ExitCode::FAILURE,
        },
        Command::Run => {
            processor.run().await;
            ExitCode::SUCCESS
        }
        Command::Watch => {
            let interval = Duration::from_secs(config.watch_interval_secs.max(1));
            info!("Watching {} every {:?}", config.imap.scan_folder, interval);
            loop {
                let summary = processor.run().await;
                if summary.processed() == 0 {
                    info!("Nothing to do, sleeping");
                }
                async_std::task::sleep(interval).await;
            }
        }
    }
}
