use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use csv::Writer;
use tracing::warn;

use crate::session::Rejection;

/// Characters of node HTML kept per rejection.
const HTML_PREVIEW_CHARS: usize = 300;

/// Logger for result nodes that no strategy could turn into a lead.
pub struct RejectionLogger {
    file_path: PathBuf,
    writer: Mutex<Option<Writer<File>>>,
    enabled: bool,
}

impl RejectionLogger {
    pub fn new(output_dir: &Path, query_slug: &str, enabled: bool) -> Self {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let file_path = output_dir.join(format!("rejections_{}_{}.csv", query_slug, timestamp));

        Self {
            file_path,
            writer: Mutex::new(None),
            enabled,
        }
    }

    /// Create the log file and write its header
    pub fn initialize(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut writer = Writer::from_path(&self.file_path)?;
        writer.write_record(["Timestamp", "Node Index", "Attempts", "HTML Preview"])?;

        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(writer);
        Ok(())
    }

    pub fn log_rejection(&self, rejection: &Rejection) {
        if !self.enabled {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let attempts = rejection
            .attempts
            .iter()
            .map(|a| format!("{}={}", a.strategy, a.matches))
            .collect::<Vec<_>>()
            .join(";");
        let preview: String = rejection.html.chars().take(HTML_PREVIEW_CHARS).collect();

        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(writer) = guard.as_mut() {
            let index = rejection.index.to_string();
            if let Err(e) = writer.write_record([timestamp.as_str(), index.as_str(), attempts.as_str(), preview.as_str()]) {
                warn!("Failed to write to rejection log: {}", e);
            }
        }
    }

    pub fn log_all(&self, rejections: &[Rejection]) {
        for rejection in rejections {
            self.log_rejection(rejection);
        }
    }

    pub fn close(&self) {
        if !self.enabled {
            return;
        }

        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush rejection log: {}", e);
            }
        }
        *guard = None;
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for RejectionLogger {
    fn drop(&mut self) {
        self.close();
    }
}
