use crate::error::{format_bytes, MirrorError, Result};
use crate::extractor::mirror::ExtractionReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const REPORT_DIR_NAME: &str = ".sensormirror";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub archive_root: PathBuf,
    pub mirror_root: PathBuf,
    pub tasks: Vec<String>,
    pub sensors: Vec<String>,
    pub participants: Vec<ExtractionReport>,
    pub summary: BatchSummary,
    pub started_at: DateTime<Utc>,
    pub interrupted: bool,
    pub config_used: ConfigSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub participants_requested: usize,
    pub participants_completed: usize,
    pub participants_aborted: usize,
    pub pairs_copied: usize,
    pub warnings: usize,
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub auxiliary_dir: String,
    pub suffix: String,
    pub atomic_copy: bool,
    pub participant_pattern: Option<String>,
}

impl BatchReport {
    pub fn new(
        archive_root: PathBuf,
        mirror_root: PathBuf,
        tasks: Vec<String>,
        sensors: Vec<String>,
        participants_requested: usize,
        config_used: ConfigSnapshot,
    ) -> Self {
        Self {
            archive_root,
            mirror_root,
            tasks,
            sensors,
            participants: Vec::new(),
            summary: BatchSummary {
                participants_requested,
                ..BatchSummary::default()
            },
            started_at: Utc::now(),
            interrupted: false,
            config_used,
        }
    }

    pub fn push(&mut self, report: ExtractionReport) {
        let summary = &mut self.summary;

        if report.aborted() {
            summary.participants_aborted += 1;
        } else {
            summary.participants_completed += 1;
        }

        let totals = report.totals();
        summary.pairs_copied += report.copied.len();
        summary.warnings += report.warnings().count();
        summary.files_copied += totals.files;
        summary.bytes_copied += totals.bytes;

        self.participants.push(report);
    }

    pub fn finish(&mut self, duration: Duration, interrupted: bool) {
        self.summary.duration = duration;
        self.interrupted = interrupted;
    }

    pub fn has_aborted_participants(&self) -> bool {
        self.summary.participants_aborted > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.summary.warnings > 0
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.participants
            .iter()
            .flat_map(ExtractionReport::diagnostics)
            .collect()
    }
}

/// Persists batch reports under `<mirror root>/.sensormirror/`.
pub struct ReportWriter {
    mirror_root: PathBuf,
    report_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(mirror_root: PathBuf) -> Self {
        let report_dir = mirror_root.join(REPORT_DIR_NAME);
        Self {
            mirror_root,
            report_dir,
        }
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// Creates the mirror root if needed and checks it is writable.
    pub fn initialize(&self) -> Result<()> {
        if !self.mirror_root.exists() {
            fs::create_dir_all(&self.mirror_root).map_err(|e| MirrorError::Permission {
                path: format!(
                    "Cannot create mirror root {}: {}",
                    self.mirror_root.display(),
                    e
                ),
            })?;
        }

        let test_file = self.mirror_root.join(".sensormirror_write_test");
        match fs::File::create(&test_file) {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                return Err(MirrorError::Permission {
                    path: format!(
                        "No write permission for directory {}: {}",
                        self.mirror_root.display(),
                        e
                    ),
                });
            }
        }

        Ok(())
    }

    /// Writes `report-<timestamp>.json` and `.txt`; returns both paths.
    pub fn write(&self, report: &BatchReport) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(&self.report_dir).map_err(|e| MirrorError::Report {
            message: format!("Cannot create {}: {}", self.report_dir.display(), e),
        })?;

        let stem = format!("report-{}", report.started_at.format("%Y%m%dT%H%M%S%.3fZ"));
        let json_path = self.report_dir.join(format!("{}.json", stem));
        let text_path = self.report_dir.join(format!("{}.txt", stem));

        self.save_report_json(report, &json_path)?;
        self.save_report_text(report, &text_path)
            .map_err(|e| MirrorError::Report {
                message: format!("{}: {}", text_path.display(), e),
            })?;

        tracing::info!(path = %json_path.display(), "Wrote batch report");

        Ok((json_path, text_path))
    }

    fn save_report_json(&self, report: &BatchReport, path: &Path) -> Result<()> {
        let json_content =
            serde_json::to_string_pretty(report).map_err(|e| MirrorError::Report {
                message: format!("Failed to serialize report to JSON: {}", e),
            })?;

        fs::write(path, json_content).map_err(|e| MirrorError::Report {
            message: format!("{}: {}", path.display(), e),
        })
    }

    fn save_report_text(&self, report: &BatchReport, path: &Path) -> std::io::Result<()> {
        let mut file = fs::File::create(path)?;

        writeln!(file, "SensorMirror Extraction Report")?;
        writeln!(file, "==============================")?;
        writeln!(file)?;

        writeln!(file, "Archive root: {}", report.archive_root.display())?;
        writeln!(file, "Mirror root: {}", report.mirror_root.display())?;
        writeln!(
            file,
            "Started at: {}",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(file, "Duration: {:?}", report.summary.duration)?;
        writeln!(file, "Tasks: {}", report.tasks.join(", "))?;
        writeln!(file, "Sensors: {}", report.sensors.join(", "))?;
        if report.interrupted {
            writeln!(file, "Run was interrupted before all participants were processed")?;
        }
        writeln!(file)?;

        let summary = &report.summary;
        writeln!(file, "Summary:")?;
        writeln!(
            file,
            "  Participants: {} requested, {} completed, {} aborted",
            summary.participants_requested,
            summary.participants_completed,
            summary.participants_aborted
        )?;
        writeln!(file, "  Pairs copied: {}", summary.pairs_copied)?;
        writeln!(
            file,
            "  Files copied: {} ({})",
            summary.files_copied,
            format_bytes(summary.bytes_copied)
        )?;
        writeln!(file, "  Warnings: {}", summary.warnings)?;
        writeln!(file)?;

        writeln!(file, "Configuration used:")?;
        writeln!(file, "  Auxiliary directory: {}", report.config_used.auxiliary_dir)?;
        writeln!(file, "  Mirror suffix: {}", report.config_used.suffix)?;
        writeln!(file, "  Atomic copy: {}", report.config_used.atomic_copy)?;
        if let Some(ref pattern) = report.config_used.participant_pattern {
            writeln!(file, "  Participant pattern: {}", pattern)?;
        }
        writeln!(file)?;

        writeln!(file, "Participants:")?;
        for participant in &report.participants {
            let status = if participant.aborted() {
                "ABORTED"
            } else if participant.is_clean() {
                "ok"
            } else {
                "ok with warnings"
            };
            writeln!(file, "  {} [{}]", participant.participant, status)?;

            for pair in &participant.copied {
                writeln!(
                    file,
                    "    + {}/{} ({} files, {})",
                    pair.task,
                    pair.sensor,
                    pair.stats.files,
                    format_bytes(pair.stats.bytes)
                )?;
            }
            for issue in &participant.issues {
                writeln!(file, "    - {}", issue)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::mirror::MirrorExtractor;
    use tempfile::TempDir;

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot {
            auxiliary_dir: "osimxml".to_string(),
            suffix: "_modified".to_string(),
            atomic_copy: true,
            participant_pattern: None,
        }
    }

    fn build_reports(archive: &Path, mirror: &Path) -> Vec<ExtractionReport> {
        fs::create_dir_all(archive.join("AB07/2020_01_01/stair/imu")).unwrap();
        fs::write(archive.join("AB07/2020_01_01/stair/imu/t.parquet"), "12345").unwrap();

        let extractor = MirrorExtractor::new(archive, mirror).unwrap();
        vec![
            extractor.extract("AB07", ["stair", "ramp"], ["imu"]),
            extractor.extract("AB99", ["stair"], ["imu"]),
        ]
    }

    #[test]
    fn test_summary_accumulation() {
        let archive = TempDir::new().unwrap();
        let mirror = TempDir::new().unwrap();

        let mut batch = BatchReport::new(
            archive.path().to_path_buf(),
            mirror.path().to_path_buf(),
            vec!["ramp".to_string(), "stair".to_string()],
            vec!["imu".to_string()],
            2,
            snapshot(),
        );
        for report in build_reports(archive.path(), mirror.path()) {
            batch.push(report);
        }
        batch.finish(Duration::from_millis(5), false);

        assert_eq!(batch.summary.participants_requested, 2);
        assert_eq!(batch.summary.participants_completed, 1);
        assert_eq!(batch.summary.participants_aborted, 1);
        assert_eq!(batch.summary.pairs_copied, 1);
        assert_eq!(batch.summary.warnings, 1);
        assert_eq!(batch.summary.files_copied, 1);
        assert_eq!(batch.summary.bytes_copied, 5);
        assert!(batch.has_aborted_participants());
        assert!(batch.has_warnings());
        assert_eq!(batch.diagnostics().len(), 2);
    }

    #[test]
    fn test_report_files_written() {
        let archive = TempDir::new().unwrap();
        let mirror = TempDir::new().unwrap();

        let mut batch = BatchReport::new(
            archive.path().to_path_buf(),
            mirror.path().to_path_buf(),
            vec!["stair".to_string()],
            vec!["imu".to_string()],
            2,
            snapshot(),
        );
        for report in build_reports(archive.path(), mirror.path()) {
            batch.push(report);
        }

        let writer = ReportWriter::new(mirror.path().to_path_buf());
        writer.initialize().unwrap();
        let (json_path, text_path) = writer.write(&batch).unwrap();

        assert!(json_path.starts_with(writer.report_dir()));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["summary"]["pairs_copied"], 1);
        assert_eq!(
            json["participants"][1]["issues"][0]["kind"],
            "participant_not_found"
        );

        let text = fs::read_to_string(&text_path).unwrap();
        assert!(text.contains("AB07 [ok with warnings]"));
        assert!(text.contains("AB99 [ABORTED]"));
        assert!(text.contains("+ stair/imu"));
    }

    #[test]
    fn test_writer_creates_missing_mirror_root() {
        let temp = TempDir::new().unwrap();
        let writer = ReportWriter::new(temp.path().join("new").join("mirror"));
        writer.initialize().unwrap();
        assert!(temp.path().join("new").join("mirror").is_dir());
    }
}
