pub mod archive;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, Command, OutputFormat};
pub use config::{CliOverrides, Config};
pub use error::{MirrorError, Result, UserFriendlyError};

// Core functionality re-exports
pub use archive::{ArchiveLayout, DateDirectory, ParticipantFilter};
pub use bundle::{BundleFormat, BundleOperation, BundleReport, Bundler};
pub use extractor::{
    BatchReport, ConfigSnapshot, ExtractionIssue, ExtractionReport, MirrorExtractor, ReportWriter,
};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What an extract run would do, computed without writing anything.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionPlan {
    pub archive_root: PathBuf,
    pub mirror_root: PathBuf,
    pub tasks: Vec<String>,
    pub sensors: Vec<String>,
    pub participants: Vec<PlannedParticipant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedParticipant {
    pub participant: String,
    pub mirror_dir: PathBuf,
    /// `None` when the participant would be aborted; see `problem`.
    pub date_dir: Option<String>,
    pub problem: Option<String>,
}

/// Main library interface: batch extraction plus the bundle utilities.
pub struct SensorMirror {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl SensorMirror {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode != OutputMode::Json);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        })
    }

    /// Same as `new` without installing a Ctrl-C handler.
    #[cfg(test)]
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            progress_manager: ProgressManager::new(false),
            shutdown: GracefulShutdown::detached(),
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Explicit participants (CLI or config) win; otherwise every matching
    /// directory of the archive root. Sorted and deduplicated.
    pub fn resolve_participants(&self, layout: &ArchiveLayout) -> Result<Vec<String>> {
        let selection = &self.config.selection;

        let mut participants = if selection.participants.is_empty() {
            let filter = ParticipantFilter::new(
                selection.participant_pattern.as_deref(),
                &self.config.output.suffix,
            )?;
            layout.discover_participants(&filter)?
        } else {
            selection.participants.clone()
        };

        participants.sort();
        participants.dedup();

        tracing::debug!(count = participants.len(), "Resolved participants");
        Ok(participants)
    }

    pub fn plan_extraction(&self) -> Result<ExtractionPlan> {
        let extractor = MirrorExtractor::from_config(&self.config)?;
        let layout = extractor.layout();

        let participants = self
            .resolve_participants(layout)?
            .into_iter()
            .map(|participant| {
                let participant_dir = layout.participant_dir(&participant);
                let (date_dir, problem) = if !participant_dir.is_dir() {
                    (None, Some("participant directory not found".to_string()))
                } else {
                    match layout.resolve_date_dir(&participant_dir) {
                        Ok(DateDirectory::Found(date)) => {
                            (Some(date.to_string_lossy().into_owned()), None)
                        },
                        Ok(DateDirectory::Ambiguous { candidates }) => (
                            None,
                            Some(format!(
                                "{} date directories, expected exactly 1",
                                candidates.len()
                            )),
                        ),
                        Err(e) => (None, Some(e.to_string())),
                    }
                };

                PlannedParticipant {
                    mirror_dir: extractor.mirror_dir_for(&participant),
                    participant,
                    date_dir,
                    problem,
                }
            })
            .collect();

        Ok(ExtractionPlan {
            archive_root: layout.root().to_path_buf(),
            mirror_root: extractor.mirror_root().to_path_buf(),
            tasks: self.config.selection.tasks.clone(),
            sensors: self.config.selection.sensors.clone(),
            participants,
        })
    }

    /// Extracts every resolved participant in turn. Per-participant problems
    /// end up in the returned report; only setup failures are errors.
    pub fn run_batch(&self) -> Result<BatchReport> {
        let start_time = Instant::now();
        self.shutdown.check_shutdown()?;

        let extractor = MirrorExtractor::from_config(&self.config)?;
        let participants = self.resolve_participants(extractor.layout())?;

        if participants.is_empty() {
            self.output_formatter
                .warning("No participants matched; nothing to extract");
        } else {
            self.output_formatter.start_operation(&format!(
                "Mirroring {} participant(s) into {}",
                participants.len(),
                extractor.mirror_root().display()
            ));
        }

        let writer = ReportWriter::new(extractor.mirror_root().to_path_buf());
        if self.config.output.write_report {
            writer.initialize()?;
        }

        let mut batch = BatchReport::new(
            extractor.layout().root().to_path_buf(),
            extractor.mirror_root().to_path_buf(),
            self.config.selection.tasks.clone(),
            self.config.selection.sensors.clone(),
            participants.len(),
            self.create_config_snapshot(),
        );

        let progress = self
            .progress_manager
            .create_participant_progress(participants.len() as u64);
        let mut interrupted = false;

        for participant in &participants {
            if !self.shutdown.is_running() {
                interrupted = true;
                tracing::warn!(
                    remaining = participants.len() - batch.participants.len(),
                    "Stopping batch on user request"
                );
                break;
            }

            progress.set_message(participant.clone());
            let report = extractor.extract(
                participant,
                &self.config.selection.tasks,
                &self.config.selection.sensors,
            );
            self.progress_manager
                .suspend(|| self.output_formatter.print_participant_report(&report));
            batch.push(report);
            progress.inc(1);
        }

        batch.finish(start_time.elapsed(), interrupted);
        ui::progress::finish_progress_with_summary(
            &progress,
            &format!("Processed {} participant(s)", batch.participants.len()),
            batch.summary.duration,
        );
        self.progress_manager.clear();

        if self.config.output.write_report {
            let (json_path, text_path) = writer.write(&batch)?;
            self.output_formatter.info(&format!(
                "Report written to {} and {}",
                json_path.display(),
                text_path.display()
            ));
        }

        Ok(batch)
    }

    pub fn bundler(&self) -> Bundler {
        Bundler::new()
            .with_remove_sources(self.config.bundle.remove_sources)
            .with_compression_level(self.config.bundle.compression_level)
            .with_format(self.config.bundle.format)
    }

    pub fn pack<P: AsRef<Path>>(&self, dir: P) -> Result<BundleReport> {
        self.run_bundle(dir.as_ref(), BundleOperation::Pack)
    }

    pub fn unpack<P: AsRef<Path>>(&self, dir: P) -> Result<BundleReport> {
        self.run_bundle(dir.as_ref(), BundleOperation::Unpack)
    }

    /// Names `pack` or `unpack` would process in `dir`.
    pub fn bundle_candidates(&self, dir: &Path, operation: BundleOperation) -> Result<Vec<String>> {
        let bundler = self.bundler();
        match operation {
            BundleOperation::Pack => bundler.pack_candidates(dir),
            BundleOperation::Unpack => bundler.unpack_candidates(dir),
        }
    }

    fn run_bundle(&self, dir: &Path, operation: BundleOperation) -> Result<BundleReport> {
        let start_time = Instant::now();
        self.shutdown.check_shutdown()?;

        let bundler = self.bundler();
        let names = self.bundle_candidates(dir, operation)?;
        let verb = match operation {
            BundleOperation::Pack => "Packing",
            BundleOperation::Unpack => "Unpacking",
        };

        self.output_formatter.start_operation(&format!(
            "{} {} item(s) in {}",
            verb,
            names.len(),
            dir.display()
        ));

        let progress = self
            .progress_manager
            .create_bundle_progress(names.len() as u64, verb);

        let mut started = 0;
        let mut report = bundler.run(operation, dir, |name| {
            if !self.shutdown.is_running() {
                return false;
            }
            progress.set_position(started);
            progress.set_message(name.to_string());
            started += 1;
            true
        })?;
        progress.set_position(report.processed() as u64);

        report.duration = start_time.elapsed();
        ui::progress::finish_progress_with_summary(
            &progress,
            &format!("{} item(s) done", report.completed.len()),
            report.duration,
        );
        self.progress_manager.clear();

        Ok(report)
    }

    fn create_config_snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            auxiliary_dir: self.config.archive.auxiliary_dir.clone(),
            suffix: self.config.output.suffix.clone(),
            atomic_copy: self.config.output.atomic_copy,
            participant_pattern: self.config.selection.participant_pattern.clone(),
        }
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let path = output_path.as_ref();
        if path.exists() {
            return Err(MirrorError::DestinationExists {
                path: path.display().to_string(),
            });
        }

        Config::sample().save_to_file(path)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn progress_manager(&self) -> &ProgressManager {
        &self.progress_manager
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &MirrorError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Mirrors one participant with default layout settings. The mirror is
/// written under `mirror_root`, or the current working directory when `None`,
/// matching the CLI default.
pub fn extract_participant<T, S>(
    archive_root: &Path,
    participant_id: &str,
    mirror_root: Option<&Path>,
    tasks: T,
    sensors: S,
) -> Result<ExtractionReport>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
    S: IntoIterator,
    S::Item: AsRef<str>,
{
    let mirror_root = match mirror_root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let extractor = MirrorExtractor::new(archive_root, mirror_root)?;
    Ok(extractor.extract(participant_id, tasks, sensors))
}

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        target: std::env::consts::ARCH.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_date: &'static str,
    pub target: String,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SensorMirror {} ({}) built on {} for {}",
            self.version, self.git_hash, self.build_date, self.target
        )
    }
}
