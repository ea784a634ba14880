//! Selective mirroring of one participant's `date/task/sensor` subtrees.

use crate::archive::{layout::is_valid_component, ArchiveLayout, DateDirectory};
use crate::config::Config;
use crate::error::{MirrorError, Result};
use crate::extractor::tree_copy::{sweep_stale_staging, CopyStats, TreeCopier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const DEFAULT_AUXILIARY_DIR: &str = "osimxml";
pub const DEFAULT_MIRROR_SUFFIX: &str = "_modified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameScope {
    Participant,
    Task,
    Sensor,
}

impl fmt::Display for NameScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameScope::Participant => write!(f, "participant"),
            NameScope::Task => write!(f, "task"),
            NameScope::Sensor => write!(f, "sensor"),
        }
    }
}

/// Everything that can go wrong for one participant. None of these stop a
/// batch; only the participant-level ones stop the participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionIssue {
    ParticipantNotFound {
        participant: String,
        path: PathBuf,
    },
    AmbiguousDateDirectory {
        participant: String,
        found: usize,
        candidates: Vec<String>,
    },
    ParticipantUnreadable {
        participant: String,
        message: String,
    },
    InvalidName {
        scope: NameScope,
        name: String,
    },
    TaskMissing {
        task: String,
    },
    SensorMissing {
        task: String,
        sensor: String,
    },
    DestinationAlreadyExists {
        task: String,
        sensor: String,
        path: PathBuf,
    },
    CopyFailed {
        task: String,
        sensor: String,
        message: String,
    },
}

impl ExtractionIssue {
    pub fn aborts_participant(&self) -> bool {
        match self {
            ExtractionIssue::ParticipantNotFound { .. }
            | ExtractionIssue::AmbiguousDateDirectory { .. }
            | ExtractionIssue::ParticipantUnreadable { .. } => true,
            ExtractionIssue::InvalidName { scope, .. } => *scope == NameScope::Participant,
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionIssue::ParticipantNotFound { .. } => "participant_not_found",
            ExtractionIssue::AmbiguousDateDirectory { .. } => "ambiguous_date_directory",
            ExtractionIssue::ParticipantUnreadable { .. } => "participant_unreadable",
            ExtractionIssue::InvalidName { .. } => "invalid_name",
            ExtractionIssue::TaskMissing { .. } => "task_missing",
            ExtractionIssue::SensorMissing { .. } => "sensor_missing",
            ExtractionIssue::DestinationAlreadyExists { .. } => "destination_already_exists",
            ExtractionIssue::CopyFailed { .. } => "copy_failed",
        }
    }
}

impl fmt::Display for ExtractionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionIssue::ParticipantNotFound { participant, path } => {
                write!(f, "participant {} not found at {}", participant, path.display())
            }
            ExtractionIssue::AmbiguousDateDirectory {
                participant,
                found,
                candidates,
            } => {
                write!(
                    f,
                    "participant {} has {} date directories, expected exactly 1",
                    participant, found
                )?;
                if !candidates.is_empty() {
                    write!(f, " ({})", candidates.join(", "))?;
                }
                Ok(())
            }
            ExtractionIssue::ParticipantUnreadable {
                participant,
                message,
            } => write!(f, "participant {} could not be listed: {}", participant, message),
            ExtractionIssue::InvalidName { scope, name } => {
                write!(f, "{} name {:?} is not a single directory name", scope, name)
            }
            ExtractionIssue::TaskMissing { task } => write!(f, "task {} not found", task),
            ExtractionIssue::SensorMissing { task, sensor } => {
                write!(f, "sensor {} not found in task {}", sensor, task)
            }
            ExtractionIssue::DestinationAlreadyExists { task, sensor, path } => write!(
                f,
                "{}/{} already mirrored at {}, skipped",
                task,
                sensor,
                path.display()
            ),
            ExtractionIssue::CopyFailed {
                task,
                sensor,
                message,
            } => write!(f, "copying {}/{} failed: {}", task, sensor, message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedPair {
    pub task: String,
    pub sensor: String,
    pub destination: PathBuf,
    pub stats: CopyStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub participant: String,
    /// `<mirror root>/<participant><suffix>`, whether or not it was created.
    pub mirror_root: PathBuf,
    pub date_dir: Option<String>,
    pub copied: Vec<CopiedPair>,
    pub issues: Vec<ExtractionIssue>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl ExtractionReport {
    fn new(participant: &str, mirror_root: PathBuf) -> Self {
        Self {
            participant: participant.to_string(),
            mirror_root,
            date_dir: None,
            copied: Vec::new(),
            issues: Vec::new(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    pub fn aborted(&self) -> bool {
        self.issues.iter().any(ExtractionIssue::aborts_participant)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ExtractionIssue> {
        self.issues.iter().filter(|i| !i.aborts_participant())
    }

    pub fn copied_pairs(&self) -> Vec<(&str, &str)> {
        self.copied
            .iter()
            .map(|p| (p.task.as_str(), p.sensor.as_str()))
            .collect()
    }

    pub fn totals(&self) -> CopyStats {
        let mut totals = CopyStats::default();
        for pair in &self.copied {
            totals.absorb(&pair.stats);
        }
        totals
    }

    /// One line per issue, each naming the participant.
    pub fn diagnostics(&self) -> Vec<String> {
        self.issues
            .iter()
            .map(|issue| format!("{}: {}", self.participant, issue))
            .collect()
    }
}

pub struct MirrorExtractor {
    layout: ArchiveLayout,
    mirror_root: PathBuf,
    suffix: String,
    copier: TreeCopier,
}

impl MirrorExtractor {
    pub fn new<A: Into<PathBuf>, M: Into<PathBuf>>(archive_root: A, mirror_root: M) -> Result<Self> {
        Ok(Self {
            layout: ArchiveLayout::new(archive_root, DEFAULT_AUXILIARY_DIR)?,
            mirror_root: mirror_root.into(),
            suffix: DEFAULT_MIRROR_SUFFIX.to_string(),
            copier: TreeCopier::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            layout: ArchiveLayout::new(&config.archive.root, &config.archive.auxiliary_dir)?,
            mirror_root: config.output.mirror_root.clone(),
            suffix: config.output.suffix.clone(),
            copier: TreeCopier::new().with_atomic(config.output.atomic_copy),
        })
    }

    pub fn with_auxiliary_dir<S: Into<String>>(mut self, name: S) -> Result<Self> {
        self.layout = self.layout.with_auxiliary_dir(name)?;
        Ok(self)
    }

    pub fn with_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_atomic_copy(mut self, atomic: bool) -> Self {
        self.copier = self.copier.with_atomic(atomic);
        self
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    pub fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }

    pub fn mirror_dir_for(&self, participant_id: &str) -> PathBuf {
        self.mirror_root
            .join(format!("{}{}", participant_id, self.suffix))
    }

    /// Mirrors every requested (task, sensor) pair that exists for
    /// `participant_id`. Never fails: problems are recorded in the report.
    pub fn extract<T, S>(&self, participant_id: &str, tasks: T, sensors: S) -> ExtractionReport
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let start = Instant::now();
        let mut report = ExtractionReport::new(participant_id, self.mirror_dir_for(participant_id));

        self.extract_into(&mut report, participant_id, tasks, sensors);

        report.duration = start.elapsed();
        for issue in &report.issues {
            if issue.aborts_participant() {
                tracing::error!(participant = participant_id, kind = issue.kind(), "{}", issue);
            } else {
                tracing::warn!(participant = participant_id, kind = issue.kind(), "{}", issue);
            }
        }
        tracing::info!(
            participant = participant_id,
            copied = report.copied.len(),
            issues = report.issues.len(),
            "Participant processed"
        );

        report
    }

    fn extract_into<T, S>(
        &self,
        report: &mut ExtractionReport,
        participant_id: &str,
        tasks: T,
        sensors: S,
    ) where
        T: IntoIterator,
        T::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        if !is_valid_component(participant_id) {
            report.issues.push(ExtractionIssue::InvalidName {
                scope: NameScope::Participant,
                name: participant_id.to_string(),
            });
            return;
        }

        let participant_dir = self.layout.participant_dir(participant_id);
        if !participant_dir.is_dir() {
            report.issues.push(ExtractionIssue::ParticipantNotFound {
                participant: participant_id.to_string(),
                path: participant_dir,
            });
            return;
        }

        let date_dir = match self.layout.resolve_date_dir(&participant_dir) {
            Ok(DateDirectory::Found(date_dir)) => date_dir,
            Ok(DateDirectory::Ambiguous { candidates }) => {
                report.issues.push(ExtractionIssue::AmbiguousDateDirectory {
                    participant: participant_id.to_string(),
                    found: candidates.len(),
                    candidates,
                });
                return;
            }
            Err(e) => {
                report.issues.push(ExtractionIssue::ParticipantUnreadable {
                    participant: participant_id.to_string(),
                    message: e.to_string(),
                });
                return;
            }
        };
        report.date_dir = Some(date_dir.to_string_lossy().into_owned());

        match sweep_stale_staging(&report.mirror_root) {
            Ok(0) => {}
            Ok(removed) => {
                tracing::info!(participant = participant_id, removed, "Swept stale staging directories")
            }
            Err(e) => {
                tracing::warn!(participant = participant_id, error = %e, "Could not sweep staging directories")
            }
        }

        let tasks: BTreeSet<String> = tasks.into_iter().map(|t| t.as_ref().to_string()).collect();
        let sensors: BTreeSet<String> = sensors
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();

        let source_date = participant_dir.join(&date_dir);
        let mirror_date = report.mirror_root.join(&date_dir);

        for task in &tasks {
            if !is_valid_component(task) {
                report.issues.push(ExtractionIssue::InvalidName {
                    scope: NameScope::Task,
                    name: task.clone(),
                });
                continue;
            }

            let task_path = source_date.join(task);
            if !task_path.is_dir() {
                report.issues.push(ExtractionIssue::TaskMissing { task: task.clone() });
                continue;
            }

            for sensor in &sensors {
                if !is_valid_component(sensor) {
                    report.issues.push(ExtractionIssue::InvalidName {
                        scope: NameScope::Sensor,
                        name: sensor.clone(),
                    });
                    continue;
                }

                let sensor_path = task_path.join(sensor);
                if !sensor_path.is_dir() {
                    report.issues.push(ExtractionIssue::SensorMissing {
                        task: task.clone(),
                        sensor: sensor.clone(),
                    });
                    continue;
                }

                let destination = mirror_date.join(task).join(sensor);
                match self.copier.copy_tree(&sensor_path, &destination) {
                    Ok(stats) => {
                        tracing::debug!(
                            participant = participant_id,
                            task = task.as_str(),
                            sensor = sensor.as_str(),
                            files = stats.files,
                            bytes = stats.bytes,
                            "Copied sensor directory"
                        );
                        report.copied.push(CopiedPair {
                            task: task.clone(),
                            sensor: sensor.clone(),
                            destination,
                            stats,
                        });
                    }
                    Err(MirrorError::DestinationExists { .. }) => {
                        report.issues.push(ExtractionIssue::DestinationAlreadyExists {
                            task: task.clone(),
                            sensor: sensor.clone(),
                            path: destination,
                        });
                    }
                    Err(e) => {
                        report.issues.push(ExtractionIssue::CopyFailed {
                            task: task.clone(),
                            sensor: sensor.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}
