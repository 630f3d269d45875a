//! Crispen - AI upscale and restore for images
//!
//! CLI entry point: runs one generation or manages the stored key.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crispen::cli::{Cli, Command, KeyCommand, OutputFormat, RunArgs};
use crispen::config::Config;
use crispen::events::{EventBus, GenerateEvent};
use crispen::host::{FileDocument, FileKeyStore, FileLayerSink, KeyStore, WorkFolder, mask_key};
use crispen::session::{Mode, Session};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so nothing here can trace
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crispen")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("crispen.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log level comes from the config file before the full config load
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(model = %config.api.model, work_dir = ?config.work_dir(), "Crispen loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Upscale(run) => cmd_run(config, Mode::Upscale, run).await,
        Command::Restore(run) => cmd_run(config, Mode::Restore, run).await,
        Command::Generate { prompt, run } => cmd_run(config, Mode::Custom(prompt), run).await,
        Command::Key { command } => cmd_key(&config, command),
    }
}

async fn cmd_run(mut config: Config, mode: Mode, run: RunArgs) -> Result<()> {
    debug!(?mode, ?run, "cmd_run: called");
    if let Some(size) = run.size {
        config.size.preference = size;
    }

    let bus = EventBus::with_default_capacity();
    let renderer = tokio::spawn(render_events(bus.subscribe(), run.format));

    let session = Session::new(config)?.with_events(bus.emitter());
    let document = FileDocument::new(&run.image);
    let sink = match &run.output {
        Some(path) => FileLayerSink::new(path),
        None => FileLayerSink::beside(&run.image),
    };

    let result = session.run(&mode, &document, &sink).await;

    // The renderer stops at the terminal event, or once every sender is gone
    drop(session);
    drop(bus);
    renderer.await.context("Event renderer failed")?;

    let placed = result?;
    if run.format == OutputFormat::Text {
        println!("{} {}", "Saved:".green().bold(), placed.display());
    }
    Ok(())
}

async fn render_events(mut rx: broadcast::Receiver<GenerateEvent>, format: OutputFormat) {
    let mut progress_open = false;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "render_events: lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let terminal = event.is_terminal();

        if format == OutputFormat::Json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => debug!(error = %e, "render_events: failed to serialize event"),
            }
            if terminal {
                break;
            }
            continue;
        }

        if let GenerateEvent::Progress { percent } = event {
            print!("\r{} {:>3}%", "Progress:".cyan(), percent);
            let _ = std::io::stdout().flush();
            progress_open = true;
            continue;
        }

        if progress_open {
            println!();
            progress_open = false;
        }

        match event {
            GenerateEvent::Status { message, is_error } if !message.is_empty() => {
                if is_error {
                    println!("{}", message.yellow());
                } else {
                    println!("{}", message);
                }
            }
            GenerateEvent::AttemptStarted {
                size,
                attempt,
                max_attempts,
            } => {
                println!("{}", format!("Attempt {} of {} at {}", attempt, max_attempts, size).dimmed());
            }
            // Failures surface as the command's error
            _ => {}
        }

        if terminal {
            debug!("render_events: run finished");
            break;
        }
    }

    if progress_open {
        println!();
    }
}

fn cmd_key(config: &Config, command: KeyCommand) -> Result<()> {
    debug!(?command, "cmd_key: called");
    let folder = WorkFolder::open(config.work_dir())?;
    let store = FileKeyStore::new(folder.key_path()).with_env_fallback(config.api.api_key_env.clone());

    match command {
        KeyCommand::Set { key } => {
            if key.trim().is_empty() {
                return Err(eyre!("API key is empty"));
            }
            store.set(&key)?;
            println!("{}", "API key saved.".green());
        }
        KeyCommand::Show => match store.get()? {
            Some(key) => println!("{}", mask_key(&key)),
            None => println!("{}", "No API key stored".yellow()),
        },
    }
    Ok(())
}
