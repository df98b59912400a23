use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use promo_calendar::{Ledger, Registrar};
use promo_common::PromoError;
use promo_common::observability::{LogConfig, init_logging};
use promo_config::{PromoConfig, PromoConfigLoader, default_config_paths};
use promo_social::{EventDetector, ReplaySource};
use scan::{EventOutcome, ScanReport, run_scan};

mod scan;
mod wiring;

/// Watch a promotional page and register announced discount days once.
#[derive(Parser, Debug)]
#[command(name = "promo-watch", version, about)]
struct Cli {
    /// Configuration file (YAML). Defaults to ./promo-watch.yaml and the user config dir.
    #[arg(long, global = true, env = "PROMO_CONFIG")]
    config: Option<PathBuf>,

    /// Evaluate the ledger but neither register nor append.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Override `ledger.path`.
    #[arg(long, global = true, value_name = "FILE")]
    ledger: Option<PathBuf>,

    /// Override `page.max_posts`.
    #[arg(long, global = true, value_name = "N")]
    max_posts: Option<usize>,

    /// Override `page.headless`.
    #[arg(long, global = true, value_name = "BOOL")]
    headless: Option<bool>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape the configured page (default).
    Scan,
    /// Run detection over fragments saved one per line.
    Replay {
        file: PathBuf,
        /// Reference time instead of the current clock (RFC 3339).
        #[arg(long)]
        now: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("promo-watch: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_logging(LogConfig {
        log_dir: cfg.log.dir.clone(),
        level: cfg.log.level,
        format: cfg.log.format,
        ..LogConfig::default()
    }) {
        eprintln!("promo-watch: failed to initialise logging: {err:#}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "runtime.build_failed");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli, cfg)) {
        Ok(report) => {
            summarize(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = err
                .downcast_ref::<PromoError>()
                .map(PromoError::exit_code)
                .unwrap_or(1);
            if code == 2 {
                tracing::warn!(error = %err, "promo_watch.no_event");
            } else {
                tracing::error!(error = %format!("{err:#}"), "promo_watch.failed");
            }
            ExitCode::from(code)
        }
    }
}

fn load_config(cli: &Cli) -> Result<PromoConfig> {
    let mut loader = PromoConfigLoader::new();
    match &cli.config {
        Some(path) => loader = loader.with_file(path),
        None => {
            for path in default_config_paths() {
                loader = loader.with_optional_file(path);
            }
        }
    }
    let mut cfg = loader.load().context("failed to load configuration")?;

    if let Some(path) = &cli.ledger {
        cfg.ledger.path = path.clone();
    }
    if let Some(n) = cli.max_posts {
        cfg.page.max_posts = n;
    }
    if let Some(headless) = cli.headless {
        cfg.page.headless = headless;
    }
    Ok(cfg)
}

async fn run(cli: Cli, cfg: PromoConfig) -> Result<ScanReport> {
    let detector = EventDetector::new(&cfg.event.keyword).context("invalid event.keyword")?;
    let ledger = Ledger::new(&cfg.ledger.path);
    let mut registrar: Option<Box<dyn Registrar>> = if cli.dry_run {
        None
    } else {
        Some(wiring::build_registrar(&cfg.registrar)?)
    };
    let registrar = registrar.as_mut().map(|r| &mut **r as &mut dyn Registrar);

    match cli.command.unwrap_or(Command::Scan) {
        Command::Replay { file, now } => {
            let now = wiring::resolve_now(&cfg, now.as_deref())?;
            let options = wiring::scan_options(&cfg, now, cli.dry_run);
            let mut source = ReplaySource::from_file(&file).await?;
            Ok(run_scan(&mut source, &detector, &ledger, registrar, &options).await?)
        }
        Command::Scan => {
            let now = wiring::resolve_now(&cfg, None)?;
            let options = wiring::scan_options(&cfg, now, cli.dry_run);
            let (driver, mut feed) = wiring::open_feed(&cfg).await?;
            let outcome = run_scan(&mut feed, &detector, &ledger, registrar, &options).await;
            drop(feed);
            if let Err(err) = driver.close().await {
                tracing::warn!(error = %err, "browser.close_failed");
            }
            Ok(outcome?)
        }
    }
}

fn summarize(report: &ScanReport) {
    for event in &report.events {
        match &event.outcome {
            EventOutcome::Registered(receipt) => tracing::info!(
                date = %event.date,
                id = receipt.id.as_deref().unwrap_or("-"),
                link = receipt.link.as_deref().unwrap_or("-"),
                "promo_watch.registered"
            ),
            EventOutcome::AlreadyRegistered { tail } => {
                tracing::info!(date = %event.date, %tail, "promo_watch.already_registered")
            }
            EventOutcome::WouldRegister => {
                tracing::info!(date = %event.date, "promo_watch.would_register")
            }
            EventOutcome::Passed => tracing::info!(date = %event.date, "promo_watch.event_passed"),
        }
    }
    tracing::info!(
        fragments = report.fragments,
        messages = report.messages,
        registered = report.registered(),
        stop = ?report.stop,
        "promo_watch.done"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_is_the_default_command() {
        let cli = Cli::try_parse_from(["promo-watch", "--dry-run", "--max-posts", "5"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.dry_run);
        assert_eq!(cli.max_posts, Some(5));
    }

    #[test]
    fn headless_takes_an_explicit_value() {
        let cli = Cli::try_parse_from(["promo-watch", "scan", "--headless", "false"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Scan)));
        assert_eq!(cli.headless, Some(false));
    }

    #[test]
    fn replay_takes_a_file_and_reference_time() {
        let cli = Cli::try_parse_from([
            "promo-watch",
            "replay",
            "feed.txt",
            "--now",
            "2024-12-20T10:00:00+09:00",
            "--ledger",
            "/tmp/event.log",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Replay { file, now }) => {
                assert_eq!(file, PathBuf::from("feed.txt"));
                assert_eq!(now.as_deref(), Some("2024-12-20T10:00:00+09:00"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.ledger, Some(PathBuf::from("/tmp/event.log")));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
