use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::RwLock;

use crate::page_driver::DriverReport;
use crate::repair::RepairReport;
use crate::session::Diagnostics;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,   // Only progress bar and final summary
    Summary = 1,  // Run milestones (default)
    Detailed = 2, // Per-step results and warnings
    Debug = 3,    // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

/// User-facing status output for one run.
#[derive(Clone)]
pub struct RunLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    metadata: Arc<Mutex<RunMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<PathBuf>,
}

#[derive(Default, Clone)]
struct RunMetadata {
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    query: String,
    nodes_seen: usize,
    leads_collected: usize,
    rejected: usize,
    duplicates: usize,
    rows_repaired: usize,
    rows_total: usize,
    output_file: String,
}

impl RunLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: PathBuf) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    /// Errors are shown at every verbosity level.
    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", Local::now().format("%H:%M:%S%.3f"), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Route through the progress bar so it keeps its position
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    fn metadata(&self) -> MutexGuard<'_, RunMetadata> {
        self.metadata.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn start_progress(&self, total_steps: u64) {
        let pb = ProgressBar::new(total_steps);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting...");

        *self.progress_bar.write().await = Some(pb);
        self.metadata().start_time = Some(Instant::now());
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        if let Some(pb) = self.progress_bar.write().await.take() {
            pb.finish_and_clear();
        }
        self.metadata().end_time = Some(Instant::now());
        self.info(final_message);
    }

    pub fn log_search_start(&self, query: &str, max_results: usize) {
        self.metadata().query = query.to_string();
        self.info(&format!("Searching for '{}' (up to {} leads)", query, max_results));
    }

    pub fn log_session_complete(&self, diagnostics: &Diagnostics) {
        {
            let mut metadata = self.metadata();
            metadata.nodes_seen = diagnostics.nodes_seen;
            metadata.leads_collected = diagnostics.records_yielded;
            metadata.rejected = diagnostics.rejected;
            metadata.duplicates = diagnostics.duplicates;
        }
        self.info(&format!(
            "Extracted {} leads from {} result nodes",
            diagnostics.records_yielded, diagnostics.nodes_seen
        ));
        if diagnostics.rejected > 0 {
            self.warn(&format!(
                "{} result nodes matched no strategy (indices: {:?})",
                diagnostics.rejected, diagnostics.rejected_indices
            ));
        }
        for (strategy, stats) in &diagnostics.selector_attempts {
            self.debug(&format!(
                "Strategy {}: matched {}, missed {}, accepted {}",
                strategy, stats.matched, stats.missed, stats.accepted
            ));
        }
    }

    /// How far the browser got before a failed search stopped.
    pub fn log_driver_report(&self, report: &DriverReport) {
        let results_wait = match report.results_wait {
            Some(outcome) => format!("{:?}", outcome),
            None => "not reached".to_string(),
        };
        self.info(&format!(
            "Search stopped at {} (results wait: {}, scroll rounds: {}, counts: {:?})",
            report.page_url, results_wait, report.scroll_rounds, report.counts_per_round
        ));
    }

    pub fn log_repair_complete(&self, report: &RepairReport) {
        {
            let mut metadata = self.metadata();
            metadata.rows_total = report.total_rows;
            metadata.rows_repaired = report.repaired_rows;
        }
        self.info(&format!(
            "Repaired {} of {} rows ({} malformed, {} without a usable link)",
            report.repaired_rows, report.total_rows, report.malformed_rows, report.unrepairable_rows
        ));
        for name in &report.preview {
            self.info(&format!("  -> {}", name));
        }
    }

    pub fn log_export_success(&self, path: &Path) {
        self.metadata().output_file = path.display().to_string();
        self.info(&format!("Export completed: {}", path.display()));
    }

    pub fn print_final_summary(&self) {
        let metadata = self.metadata().clone();

        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!("\n=== RUN SUMMARY ===");
        if let (Some(start), Some(end)) = (metadata.start_time, metadata.end_time) {
            println!("Duration: {:.2}s", end.duration_since(start).as_secs_f64());
        }
        if !metadata.query.is_empty() {
            println!("Query: {}", metadata.query);
            println!("Result nodes: {}", metadata.nodes_seen);
            println!("Leads: {}", metadata.leads_collected);
            println!("Rejected: {}", metadata.rejected);
            println!("Duplicates: {}", metadata.duplicates);
        }
        if metadata.rows_total > 0 {
            println!("Rows repaired: {}/{}", metadata.rows_repaired, metadata.rows_total);
        }
        if !metadata.output_file.is_empty() {
            println!("Output: {}", metadata.output_file);
        }
        println!("===================\n");
    }

    /// Write buffered messages to the log file, if one was requested.
    pub fn export_logs(&self) -> io::Result<()> {
        let Some(path) = &self.log_file_path else {
            return Ok(());
        };
        let buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        for entry in buffer.iter() {
            writeln!(file, "{}", entry)?;
        }
        file.flush()
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_count() {
        assert_eq!(VerbosityLevel::from_verbose_count(0), VerbosityLevel::Summary);
        assert_eq!(VerbosityLevel::from_verbose_count(1), VerbosityLevel::Detailed);
        assert_eq!(VerbosityLevel::from_verbose_count(5), VerbosityLevel::Debug);
    }

    #[test]
    fn test_buffered_messages_respect_verbosity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let logger = RunLogger::with_log_file(VerbosityLevel::Summary, path.clone());

        logger.info("shown");
        logger.debug("hidden");
        logger.error("always");
        assert_eq!(logger.log_count(), 2);

        logger.export_logs().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("INFO: shown"));
        assert!(content.contains("ERROR: always"));
        assert!(!content.contains("hidden"));
    }

    #[test]
    fn test_driver_report_logged_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = RunLogger::with_log_file(VerbosityLevel::Summary, path.clone());

        logger.log_driver_report(&DriverReport {
            page_url: "https://maps.example/maps".to_string(),
            scroll_rounds: 2,
            counts_per_round: vec![8, 12],
            ..Default::default()
        });

        logger.export_logs().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("results wait: not reached"));
        assert!(content.contains("scroll rounds: 2, counts: [8, 12]"));
    }
}
