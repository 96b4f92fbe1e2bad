use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use mapleads::browser_pool;
use mapleads::cli::{Cli, Commands, RepairArgs, ScrapeArgs};
use mapleads::config::{self, AppConfig, CONFIG_PATH};
use mapleads::export;
use mapleads::extractor::RecordExtractor;
use mapleads::logger::{RunLogger, VerbosityLevel};
use mapleads::page_driver::{ChromePageDriver, SearchOptions};
use mapleads::rejection_logger::RejectionLogger;
use mapleads::repair::{self, RepairOptions};
use mapleads::session::ExtractionSession;
use mapleads::wait;

/// Seconds the Ctrl+C handler waits for open browsers before exiting.
static SHUTDOWN_GRACE_SECS: AtomicU64 = AtomicU64::new(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize selectors, then run mapleads again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    init_tracing(cli.verbose);

    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    let logger = match &cli.log_file {
        Some(path) => RunLogger::with_log_file(verbosity, path.clone()),
        None => RunLogger::new(verbosity),
    };

    ctrlc::set_handler(move || {
        wait::interrupt();
        eprintln!("\n⚠️  Interrupt received. Stopping the current run...");
        std::thread::sleep(Duration::from_secs(3));

        // A browser call can block up to the navigation timeout; let the
        // guard kill Chrome before exiting.
        let in_use = browser_pool::browsers_in_use();
        if in_use > 0 {
            eprintln!("⚠️  Waiting for {} browser(s) to shut down...", in_use);
            let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS.load(Ordering::SeqCst));
            if !browser_pool::wait_for_release(grace) {
                eprintln!("⚠️  Browser still busy after {:?}.", grace);
            }
        }
        eprintln!("⚠️  Force exiting.");
        std::process::exit(130);
    })
    .unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to set Ctrl-C handler: {}. Interrupt signals may not be handled gracefully.", e);
    });

    let Some(command) = cli.command else {
        eprintln!("❌ No command given. Use 'mapleads scrape --query <QUERY>' or 'mapleads repair <FILE>' (see --help).");
        std::process::exit(1);
    };

    let result = match command {
        Commands::Scrape(args) => run_scrape(&args, &logger).await,
        Commands::Repair(args) => run_repair(&args, &logger).await,
    };

    if let Err(e) = result {
        logger.error(&format!("{:#}", e));
        export_logs(&logger);
        std::process::exit(1);
    }

    export_logs(&logger);
    Ok(())
}

/// `-v` count picks the default filter; `RUST_LOG` overrides it.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,mapleads={}", level))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn export_logs(logger: &RunLogger) {
    if logger.is_log_export_enabled() {
        if let Err(e) = logger.export_logs() {
            eprintln!("⚠️  Failed to export logs: {}", e);
        }
    }
}

/// Load the configuration, offering to create it when missing.
fn load_config_or_exit() -> AppConfig {
    match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => match AppConfig::prompt_create_config() {
            Ok(Some(created_path)) => {
                println!("✅ Created default configuration file at: {}", created_path.display());
                println!("   Edit this file to customize selectors, then run mapleads again.");
                std::process::exit(0);
            }
            Ok(None) => {
                eprintln!("❌ Configuration file not found at: {}", path.display());
                eprintln!("   Run with --init to create a default configuration file.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_scrape(args: &ScrapeArgs, logger: &RunLogger) -> Result<()> {
    args.validate().map_err(|e| anyhow!("Invalid arguments: {}", e))?;
    let config = load_config_or_exit();
    SHUTDOWN_GRACE_SECS.store(config.browser.navigation_timeout_secs, Ordering::SeqCst);

    let extractor = RecordExtractor::from_config(&config.extractor, &config.search.base_url)
        .context("Invalid extractor configuration")?;
    let options = SearchOptions::from_config(&config.search);
    let session = ExtractionSession::new(ChromePageDriver::new(config.browser.clone()), extractor, options);

    logger.start_progress(3).await;
    logger.log_search_start(&args.query, args.max_results);
    logger.update_progress("Searching...").await;

    let outcome = match session.run(&args.query, args.max_results).await {
        Ok(outcome) => outcome,
        Err(e) => {
            logger.finish_progress("Search failed").await;
            if let Some(report) = &e.diagnostics.driver {
                logger.log_driver_report(report);
            }
            return Err(e.into());
        }
    };
    logger.advance_progress(1).await;
    logger.log_session_complete(&outcome.diagnostics);

    let output_dir = args.get_output_dir();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    logger.update_progress("Exporting...").await;
    let output_path = export::leads_output_path(&output_dir, &args.query, &args.format, Utc::now());
    match args.format.as_str() {
        "json" => export::export_json(&outcome.records, &outcome.diagnostics, &output_path)?,
        _ => export::export_csv(&outcome.records, &output_path)?,
    }
    logger.log_export_success(&output_path);
    logger.advance_progress(1).await;

    let rejection_logger = RejectionLogger::new(&output_dir, &export::query_slug(&args.query), args.log_rejections);
    if rejection_logger.is_enabled() {
        rejection_logger
            .initialize()
            .context("Failed to create rejection log")?;
        rejection_logger.log_all(&outcome.diagnostics.rejections);
        rejection_logger.close();
        logger.info(&format!(
            "Logged {} rejected nodes to {}",
            outcome.diagnostics.rejections.len(),
            rejection_logger.file_path().display()
        ));
    }
    logger.advance_progress(1).await;

    logger.finish_progress("Extraction complete").await;
    export::print_session_summary(&outcome.records, &outcome.diagnostics);
    logger.print_final_summary();
    Ok(())
}

async fn run_repair(args: &RepairArgs, logger: &RunLogger) -> Result<()> {
    // Repair works without a config file; an invalid one is still an error.
    let options = if Path::new(CONFIG_PATH).exists() {
        let config = AppConfig::load().context("Configuration error")?;
        RepairOptions::from_config(&config.repair, &config.extractor.link_marker)?
    } else {
        logger.debug("No configuration file, using default repair settings");
        RepairOptions::default()
    };
    let options = options.with_output_dir(args.output_dir.clone());

    logger.start_progress(1).await;
    logger.update_progress("Repairing...").await;
    logger.info(&format!("Repairing {}", args.input.display()));

    let report = match repair::repair(&args.input, &options) {
        Ok(report) => report,
        Err(e) => {
            logger.finish_progress("Repair failed").await;
            return Err(e.into());
        }
    };
    logger.advance_progress(1).await;
    logger.log_repair_complete(&report);
    logger.log_export_success(&report.output_path);

    logger.finish_progress("Repair complete").await;
    logger.print_final_summary();
    Ok(())
}
