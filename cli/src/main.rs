use clap::Parser;

mod app;
mod commands;
mod http;
mod registry;

use commands::cli;
use spector_core::api::{self as core_api, CliError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = core_api::load_default().map_err(|e| CliError::Config(e.to_string()))?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    match args.command {
        cli::Commands::Run(run_args) => app::handle_run(run_args, cfg).await,
        cli::Commands::Batch(batch_args) => app::handle_batch(batch_args, cfg).await,
        cli::Commands::Serve(serve_args) => {
            http::server::handle_serve(serve_args, cfg).await?;
            Ok(0)
        }
    }
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0-3: verification outcomes (met / unmet / failed / cancelled)
    // 11: config error
    // 20: command / IO error
    // 40: verification machinery error surfaced directly
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Verify(_) => 40,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(cfg: &core_api::LoggingConfig) -> Result<(), String> {
    if !cfg.enabled {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));
    let registry = tracing_subscriber::registry().with(filter);

    let console_layer = cfg.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let file_layer = if cfg.file {
        let directory = cfg
            .directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().to_string_lossy().to_string());
        std::fs::create_dir_all(&directory).map_err(|e| e.to_string())?;
        let appender = tracing_appender::rolling::daily(directory, "spector.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        Some(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
    } else {
        None
    };

    registry
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| e.to_string())
}
