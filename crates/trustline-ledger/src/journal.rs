//! Durable event journal
//!
//! File-based persistence for moderation events:
//! - JSON-lines format for append-only writes
//! - Automatic rotation based on size/age
//! - Query and filter capabilities for the review dashboard
//! - Export functionality for guardian/compliance reports

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::event::{EventQuery, ModerationEvent};

/// Configuration for event journaling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Directory to store journal files
    pub journal_dir: PathBuf,

    /// Maximum file size before rotation (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum age before rotation (seconds)
    #[serde(default = "default_max_file_age")]
    pub max_file_age_secs: u64,

    /// Retain rotated files for this many days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Flush to disk after this many events
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            journal_dir: PathBuf::from("./events"),
            max_file_size: default_max_file_size(),
            max_file_age_secs: default_max_file_age(),
            retention_days: default_retention_days(),
            flush_interval: default_flush_interval(),
        }
    }
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_max_file_age() -> u64 {
    86400 // 24 hours
}

fn default_retention_days() -> u32 {
    90
}

fn default_flush_interval() -> usize {
    10
}

const CURRENT_FILE: &str = "events_current.jsonl";

/// Journal writer with rotation support
pub struct JournalWriter {
    config: JournalConfig,
    current_file: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    current_size: u64,
    current_start: SystemTime,
    events_since_flush: usize,
}

impl JournalWriter {
    /// Create a new journal writer
    pub fn new(config: JournalConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.journal_dir)?;

        let mut writer = Self {
            config,
            current_file: None,
            current_path: None,
            current_size: 0,
            current_start: SystemTime::now(),
            events_since_flush: 0,
        };

        writer.open_new_file()?;
        Ok(writer)
    }

    /// Append one event to the journal
    pub fn write_event(&mut self, event: &ModerationEvent) -> std::io::Result<()> {
        if self.should_rotate() {
            self.rotate()?;
        }

        let json = serde_json::to_string(event)?;
        let line = format!("{}\n", json);
        let bytes = line.as_bytes();

        if let Some(ref mut writer) = self.current_file {
            writer.write_all(bytes)?;
            self.current_size += bytes.len() as u64;
            self.events_since_flush += 1;

            if self.events_since_flush >= self.config.flush_interval {
                writer.flush()?;
                self.events_since_flush = 0;
            }
        }

        Ok(())
    }

    /// Force flush to disk
    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
            self.events_since_flush = 0;
        }
        Ok(())
    }

    fn should_rotate(&self) -> bool {
        if self.current_size >= self.config.max_file_size {
            return true;
        }

        let age = SystemTime::now()
            .duration_since(self.current_start)
            .unwrap_or_default();
        age.as_secs() >= self.config.max_file_age_secs
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }
        self.current_file = None;

        if let Some(ref current_path) = self.current_path {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            let rotated_name = format!("events_{}.jsonl", timestamp);
            let rotated_path = self.config.journal_dir.join(&rotated_name);

            if let Err(e) = std::fs::rename(current_path, &rotated_path) {
                warn!("Failed to rotate journal file: {}", e);
            } else {
                info!("Rotated journal file to: {:?}", rotated_path);
            }
        }

        self.open_new_file()?;

        if let Err(e) = self.cleanup_old_files() {
            warn!("Failed to cleanup old journal files: {}", e);
        }

        Ok(())
    }

    fn open_new_file(&mut self) -> std::io::Result<()> {
        let path = self.config.journal_dir.join(CURRENT_FILE);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let metadata = file.metadata()?;
        self.current_size = metadata.len();
        self.current_start = SystemTime::now();
        self.current_file = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.events_since_flush = 0;

        Ok(())
    }

    fn cleanup_old_files(&self) -> std::io::Result<()> {
        let retention_secs = self.config.retention_days as u64 * 86400;
        let cutoff = SystemTime::now() - std::time::Duration::from_secs(retention_secs);

        for entry in std::fs::read_dir(&self.config.journal_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.file_name().is_some_and(|n| n == CURRENT_FILE) {
                continue;
            }

            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if modified < cutoff {
                        info!("Removing old journal file: {:?}", path);
                        std::fs::remove_file(&path)?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Journal reader for querying persisted events
pub struct JournalReader {
    config: JournalConfig,
}

impl JournalReader {
    /// Create a new journal reader
    pub fn new(config: JournalConfig) -> Self {
        Self { config }
    }

    /// Query journaled events
    pub fn query(&self, query: &EventQuery) -> std::io::Result<Vec<ModerationEvent>> {
        let mut results = Vec::new();

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(1000);
        let mut skipped = 0;

        for file_path in self.journal_files()? {
            let file = File::open(&file_path)?;
            let reader = BufReader::new(file);

            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }

                match serde_json::from_str::<ModerationEvent>(&line) {
                    Ok(event) => {
                        if query.matches(&event) {
                            if skipped < offset {
                                skipped += 1;
                                continue;
                            }

                            results.push(event);

                            if results.len() >= limit {
                                return Ok(results);
                            }
                        }
                    }
                    Err(e) => {
                        debug!("Failed to parse journaled event: {}", e);
                        continue;
                    }
                }
            }
        }

        Ok(results)
    }

    /// Count total events matching a query
    pub fn count(&self, query: &EventQuery) -> std::io::Result<usize> {
        let mut count = 0;

        for file_path in self.journal_files()? {
            let file = File::open(&file_path)?;
            let reader = BufReader::new(file);

            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }

                if let Ok(event) = serde_json::from_str::<ModerationEvent>(&line) {
                    if query.matches(&event) {
                        count += 1;
                    }
                }
            }
        }

        Ok(count)
    }

    /// Render matching events in the given format
    pub fn export_string(
        &self,
        query: &EventQuery,
        format: ExportFormat,
    ) -> std::io::Result<String> {
        let events = self.query(query)?;
        render(&events, format)
    }

    /// Export matching events to a file
    pub fn export_to_file(
        &self,
        query: &EventQuery,
        output_path: &Path,
        format: ExportFormat,
    ) -> std::io::Result<usize> {
        let events = self.query(query)?;
        let content = render(&events, format)?;

        let mut file = File::create(output_path)?;
        write!(file, "{}", content)?;

        Ok(events.len())
    }

    /// All journal files, oldest first
    fn journal_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.config.journal_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "jsonl") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Render events in the given export format
fn render(events: &[ModerationEvent], format: ExportFormat) -> std::io::Result<String> {
    let mut out = String::new();

    match format {
        ExportFormat::JsonLines => {
            for event in events {
                out.push_str(&serde_json::to_string(event)?);
                out.push('\n');
            }
        }
        ExportFormat::Json => {
            out = serde_json::to_string_pretty(events)?;
        }
        ExportFormat::Csv => {
            out.push_str(
                "id,user_id,surface,allowed,categories,severity,reason,fallback,created_at\n",
            );

            for event in events {
                let categories = event
                    .categories
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(";");

                out.push_str(&format!(
                    "{},{},{},{},{},{},{},{},{}\n",
                    event.id,
                    event.user_id,
                    event.surface,
                    event.allowed,
                    categories,
                    event.severity.as_str(),
                    event.reason.replace(',', ";"),
                    event.fallback,
                    event.created_at.to_rfc3339()
                ));
            }
        }
    }

    Ok(out)
}

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON Lines format (one JSON object per line)
    JsonLines,
    /// Pretty-printed JSON array
    Json,
    /// CSV format
    Csv,
}

impl ExportFormat {
    /// Parse a format name from a query string
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "jsonl" => Some(Self::JsonLines),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}
