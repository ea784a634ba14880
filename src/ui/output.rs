use crate::bundle::{BundleOperation, BundleReport};
use crate::error::{format_bytes, MirrorError, UserFriendlyError};
use crate::extractor::{BatchReport, ExtractionReport};
use crate::ui::progress::format_duration;
use console::{style, Emoji};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

impl OutputMode {
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputMode::Json,
            "plain" => OutputMode::Plain,
            _ => OutputMode::Human,
        }
    }
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => {
                console::Term::stdout().features().colors_supported() && !quiet
            }
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn success(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Success, message),
                OutputMode::Json => self.print_json_message("success", message),
                OutputMode::Plain => println!("SUCCESS: {}", message),
            }
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    /// Shown at default verbosity; missing tasks and sensors land here.
    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn debug(&self, message: &str) {
        if self.should_show_message(2) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("  {}", style(message).dim());
                    } else {
                        println!("  DEBUG: {}", message);
                    }
                }
                OutputMode::Json => self.print_json_message("debug", message),
                OutputMode::Plain => println!("DEBUG: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &MirrorError) {
        let user_message = error.user_message();
        self.error(&user_message);

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    eprintln!();
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(&format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => {
                    eprintln!("SUGGESTION: {}", suggestion);
                }
            }
        }
    }

    /// One participant's outcome, printed as soon as it completes.
    pub fn print_participant_report(&self, report: &ExtractionReport) {
        match self.mode {
            OutputMode::Json => self.print_json_event("participant", report),
            OutputMode::Human | OutputMode::Plain => {
                if report.aborted() {
                    for line in report.diagnostics() {
                        self.error(&line);
                    }
                    return;
                }

                let totals = report.totals();
                self.success(&format!(
                    "{}: {} pair(s) copied to {} ({} files, {})",
                    report.participant,
                    report.copied.len(),
                    report.mirror_root.display(),
                    totals.files,
                    format_bytes(totals.bytes)
                ));
                for pair in &report.copied {
                    self.debug(&format!(
                        "{}/{} -> {}",
                        pair.task,
                        pair.sensor,
                        pair.destination.display()
                    ));
                }
                for line in report.diagnostics() {
                    self.warning(&line);
                }
            }
        }
    }

    pub fn print_batch_report(&self, report: &BatchReport) {
        match self.mode {
            OutputMode::Human => self.print_human_batch_summary(report),
            OutputMode::Json => {
                let json_output =
                    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
                println!("{}", json_output);
            }
            OutputMode::Plain => self.print_plain_batch_summary(report),
        }
    }

    pub fn print_bundle_report(&self, report: &BundleReport) {
        match self.mode {
            OutputMode::Json => {
                let json_output =
                    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
                println!("{}", json_output);
            }
            OutputMode::Human | OutputMode::Plain => {
                if self.quiet {
                    for failure in &report.failures {
                        self.error(&format!("{}: {}", failure.name, failure.message));
                    }
                    return;
                }

                let verb = match report.operation {
                    BundleOperation::Pack => "Packed",
                    BundleOperation::Unpack => "Unpacked",
                };

                self.print_separator();
                for item in &report.completed {
                    println!(
                        "  {} {} ({}){}",
                        verb,
                        item.name,
                        format_bytes(item.archive_bytes),
                        if item.source_removed { ", source removed" } else { "" }
                    );
                }
                for failure in &report.failures {
                    self.error(&format!("{}: {}", failure.name, failure.message));
                }
                println!(
                    "  {} {} item(s), {} failure(s) in {} ({})",
                    verb,
                    report.completed.len(),
                    report.failures.len(),
                    report.directory.display(),
                    format_duration(report.duration)
                );
                if report.interrupted {
                    self.warning("Interrupted before all items were processed");
                }
                self.print_separator();
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => {
                println!("=== {} ===", title);
            }
        }
    }

    /// Indented key/value line for plans and summaries; JSON mode skips it.
    pub fn print_detail(&self, label: &str, value: &str) {
        if self.quiet || self.mode == OutputMode::Json {
            return;
        }
        println!("  {}: {}", label, value);
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => {
                println!("{}", "-".repeat(60));
            }
            OutputMode::Json => {}
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        #[allow(clippy::type_complexity)]
        let (emoji, color_fn): (Emoji, Box<dyn Fn(&str) -> console::StyledObject<&str>>) =
            match msg_type {
                MessageType::Success => (CHECKMARK, Box::new(|msg| style(msg).green().bold())),
                MessageType::Error => (CROSS, Box::new(|msg| style(msg).red().bold())),
                MessageType::Warning => (WARNING, Box::new(|msg| style(msg).yellow().bold())),
                MessageType::Info => (INFO, Box::new(|msg| style(msg).cyan())),
            };

        if self.use_colors {
            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, color_fn(message)),
                _ => println!("{}{}", emoji, color_fn(message)),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };

            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_event<T: Serialize>(&self, event: &str, payload: &T) {
        self.print_json_object(&serde_json::json!({
            "type": event,
            "data": payload,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn print_human_batch_summary(&self, report: &BatchReport) {
        if self.quiet {
            return;
        }

        let summary = &report.summary;
        println!();
        self.print_separator();

        let headline = if report.interrupted {
            "Extraction interrupted"
        } else if report.has_aborted_participants() {
            "Extraction finished with aborted participants"
        } else {
            "Extraction completed"
        };
        if self.use_colors {
            let styled = if report.interrupted || report.has_aborted_participants() {
                style(headline).yellow().bold()
            } else {
                style(headline).green().bold()
            };
            println!("{}", styled);
        } else {
            println!("{}", headline);
        }

        println!();
        let rows = [
            (
                "Participants",
                format!(
                    "{} ok, {} aborted, {} requested",
                    summary.participants_completed,
                    summary.participants_aborted,
                    summary.participants_requested
                ),
            ),
            ("Pairs copied", summary.pairs_copied.to_string()),
            (
                "Files copied",
                format!(
                    "{} ({})",
                    summary.files_copied,
                    format_bytes(summary.bytes_copied)
                ),
            ),
            ("Warnings", summary.warnings.to_string()),
            ("Time taken", format_duration(summary.duration)),
        ];
        for (label, value) in rows {
            let value = if self.use_colors {
                style(value).cyan().bold().to_string()
            } else {
                value
            };
            println!("  {:<14}{}", format!("{}:", label), value);
        }

        self.print_separator();
    }

    fn print_plain_batch_summary(&self, report: &BatchReport) {
        if self.quiet {
            return;
        }

        let summary = &report.summary;
        println!(
            "COMPLETED: {} participants ok, {} aborted",
            summary.participants_completed, summary.participants_aborted
        );
        println!("Pairs copied: {}", summary.pairs_copied);
        println!("Files copied: {}", summary.files_copied);
        println!("Bytes copied: {}", summary.bytes_copied);
        println!("Warnings: {}", summary.warnings);
        println!("Duration: {:?}", summary.duration);
        if report.interrupted {
            println!("INTERRUPTED: true");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ConfigSnapshot, MirrorExtractor};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_output_mode_parsing() {
        assert_eq!(OutputMode::from_string("human"), OutputMode::Human);
        assert_eq!(OutputMode::from_string("json"), OutputMode::Json);
        assert_eq!(OutputMode::from_string("PLAIN"), OutputMode::Plain);
        assert_eq!(OutputMode::from_string("invalid"), OutputMode::Human);
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = OutputFormatter::new(OutputMode::Human, 1, false);
        assert_eq!(formatter.mode(), OutputMode::Human);
        assert_eq!(formatter.verbose_level, 1);
        assert!(!formatter.quiet);
    }

    #[test]
    fn test_quiet_mode() {
        let formatter = OutputFormatter::new(OutputMode::Human, 2, true);
        assert_eq!(formatter.verbose_level, 0);
        assert!(!formatter.use_colors);
    }

    #[test]
    fn test_should_show_message() {
        let formatter = OutputFormatter::new(OutputMode::Plain, 1, false);
        assert!(formatter.should_show_message(0));
        assert!(formatter.should_show_message(1));
        assert!(!formatter.should_show_message(2));

        let quiet_formatter = OutputFormatter::new(OutputMode::Plain, 2, true);
        assert!(!quiet_formatter.should_show_message(0));
    }

    #[test]
    fn test_reports_print_in_every_mode() {
        let archive = TempDir::new().unwrap();
        let mirror = TempDir::new().unwrap();
        std::fs::create_dir_all(archive.path().join("AB07/2020_01_01/stair/imu")).unwrap();

        let extractor = MirrorExtractor::new(archive.path(), mirror.path()).unwrap();
        let ok = extractor.extract("AB07", ["stair", "ramp"], ["imu"]);
        let aborted = extractor.extract("AB99", ["stair"], ["imu"]);

        let mut batch = BatchReport::new(
            PathBuf::from(archive.path()),
            PathBuf::from(mirror.path()),
            vec!["stair".to_string()],
            vec!["imu".to_string()],
            2,
            ConfigSnapshot {
                auxiliary_dir: "osimxml".to_string(),
                suffix: "_modified".to_string(),
                atomic_copy: true,
                participant_pattern: None,
            },
        );
        batch.push(ok.clone());
        batch.push(aborted.clone());
        batch.finish(Duration::from_millis(12), false);

        let mut bundle = BundleReport::new(BundleOperation::Pack, PathBuf::from(mirror.path()));
        bundle.record("AB07", Err(MirrorError::Cancelled));

        for mode in [OutputMode::Human, OutputMode::Json, OutputMode::Plain] {
            let formatter = OutputFormatter::new(mode, 2, false);
            formatter.print_participant_report(&ok);
            formatter.print_participant_report(&aborted);
            formatter.print_batch_report(&batch);
            formatter.print_bundle_report(&bundle);
            formatter.print_detail("Tasks", "stair");
        }
    }
}
