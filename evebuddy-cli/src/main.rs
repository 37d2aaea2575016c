//! EveBuddy command-line interface.

mod args;
mod assets;
mod commands;
mod config;
mod error;
mod paths;

use std::fs::File;

use clap::Parser;
use simplelog::ColorChoice;
use simplelog::CombinedLogger;
use simplelog::LevelFilter;
use simplelog::SharedLogger;
use simplelog::TermLogger;
use simplelog::TerminalMode;
use simplelog::WriteLogger;

use crate::args::Cli;
use crate::args::Commands;
use crate::config::Settings;
use crate::error::CliError;
use crate::error::CliResult;

/// Logs to `latest.log` in the cache dir and warnings to stderr.
fn init_logging(verbose: bool) {
    paths::rotate_logs();

    let term_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let Some(log_path) = paths::log_file() {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(file) = File::create(&log_path) {
            loggers.push(WriteLogger::new(
                LevelFilter::Debug,
                simplelog::Config::default(),
                file,
            ));
        }
    }

    let _ = CombinedLogger::init(loggers);
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    match &cli.config {
        Some(path) => Settings::load(path, true),
        None => match paths::config_file() {
            Some(path) => Settings::load(&path, false),
            None => Ok(Settings::default()),
        },
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let settings = load_settings(&cli)?;
    match cli.command {
        Commands::Login {
            sso,
            no_browser,
            token,
        } => commands::login(settings, sso, no_browser, token).await,
        Commands::Refresh { sso, token } => commands::refresh(settings, sso, token).await,
        Commands::GenRatelimit { input, output } => {
            commands::gen_ratelimit(&input, output.as_deref())
        }
        Commands::Assets { input, collapsed } => commands::show_assets(&input, collapsed),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    log::info!("evebuddy {} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli).await {
        log::error!("{e}");
        report(&e);
        std::process::exit(e.exit_code());
    }
}

fn report(error: &CliError) {
    eprintln!("error: {error}");
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}
