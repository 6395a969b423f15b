#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! `cryo`: drive the cryostat sub-controllers from the command line.

mod cli;
mod error_fmt;
mod run;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::run::{Backend, InlineSweep, RampArgs};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    // Only affects panics and `{:?}` reports; user-facing errors go through humanize.
    let _ = color_eyre::install();

    if let Err(err) = run(cli) {
        let json = JSON_MODE.get().copied().unwrap_or(false);
        if json {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::debug!(error = ?err, "command failed");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn load_config(path: &std::path::Path) -> Result<cryo_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = cryo_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate().wrap_err("invalid config")?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, cfg: &cryo_config::Config) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => {
            let level = cli
                .log_level
                .as_deref()
                .or(cfg.logging.level.as_deref())
                .unwrap_or("info");
            EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level '{level}'"))?
        }
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.json {
        layers.push(console.json().boxed());
    } else {
        layers.push(console.boxed());
    }

    if let Some(file) = cfg.logging.file.as_deref() {
        let path = std::path::Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file '{file}' has no file name"))?;
        let appender = match cfg.logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(&cli, &cfg)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let cancel = cryo_core::CancelToken::new();
    {
        let token = cancel.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("interrupt received, cancelling");
            token.cancel();
        })
        .wrap_err("install Ctrl-C handler")?;
    }
    let be: Backend = run::build_backend(&cfg, cancel)?;

    match cli.cmd {
        Commands::Ramp {
            axis,
            target,
            rate,
            mode,
            auto_regenerate,
            pre_regenerate,
            deadline_ms,
        } => run::run_ramp(
            &cfg,
            &be,
            &RampArgs {
                axis,
                target,
                rate,
                mode,
                auto_regenerate,
                pre_regenerate,
                deadline_ms,
            },
            cli.json,
        ),
        Commands::Sweep {
            axis,
            start,
            end,
            rate,
            every_s,
            grid,
            tolerance,
            overshoot,
            channels,
            plan,
            deadline_ms,
        } => {
            let inline = match (axis, start, end) {
                (Some(axis), Some(start), Some(end)) => Some(InlineSweep {
                    axis,
                    start,
                    end,
                    rate,
                    every_s,
                    grid,
                    tolerance,
                    overshoot,
                }),
                _ => None,
            };
            run::run_sweep(
                &cfg,
                &be,
                inline,
                plan.as_deref(),
                &channels,
                deadline_ms,
                cli.json,
            )
        }
        Commands::Status => run::run_status(&be, cli.json),
        Commands::Interrupt { axis } => run::run_interrupt(&be, axis, cli.json),
        Commands::SelfCheck => run::self_check(&be),
    }
}
