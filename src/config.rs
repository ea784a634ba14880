use crate::archive::{validate_component, ParticipantFilter};
use crate::bundle::BundleFormat;
use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub archive: ArchiveConfig,
    pub selection: SelectionConfig,
    pub output: OutputConfig,
    pub bundle: BundleConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub root: PathBuf,
    /// Directory beside the date folder that holds model/metadata files.
    pub auxiliary_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub participants: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_pattern: Option<String>,
    pub tasks: Vec<String>,
    pub sensors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mirror_root: PathBuf,
    pub suffix: String,
    pub atomic_copy: bool,
    pub write_report: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BundleConfig {
    pub remove_sources: bool,
    pub compression_level: u32,
    /// Written by `pack`; `unpack` accepts either format.
    pub format: BundleFormat,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("parquet data"),
            auxiliary_dir: "osimxml".to_string(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            participants: Vec::new(),
            participant_pattern: None,
            tasks: vec![
                "levelground".to_string(),
                "ramp".to_string(),
                "stair".to_string(),
            ],
            sensors: vec![
                "conditions".to_string(),
                "gcRight".to_string(),
                "imu".to_string(),
            ],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mirror_root: PathBuf::from("."),
            suffix: "_modified".to_string(),
            atomic_copy: true,
            write_report: true,
        }
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            remove_sources: false,
            compression_level: 6,
            format: BundleFormat::TarGz,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(MirrorError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MirrorError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| MirrorError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        tracing::debug!(path = %path.display(), "Loaded configuration file");

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["sensormirror.toml", ".sensormirror.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref root) = cli_args.archive_root {
            self.archive.root = root.clone();
        }

        if let Some(ref auxiliary_dir) = cli_args.auxiliary_dir {
            self.archive.auxiliary_dir = auxiliary_dir.clone();
        }

        if let Some(ref participants) = cli_args.participants {
            self.selection.participants = participants.clone();
        }

        if let Some(ref pattern) = cli_args.participant_pattern {
            self.selection.participant_pattern = Some(pattern.clone());
        }

        if let Some(ref tasks) = cli_args.tasks {
            self.selection.tasks = tasks.clone();
        }

        if let Some(ref sensors) = cli_args.sensors {
            self.selection.sensors = sensors.clone();
        }

        if let Some(ref mirror_root) = cli_args.mirror_root {
            self.output.mirror_root = mirror_root.clone();
        }

        if let Some(atomic_copy) = cli_args.atomic_copy {
            self.output.atomic_copy = atomic_copy;
        }

        if let Some(write_report) = cli_args.write_report {
            self.output.write_report = write_report;
        }

        if let Some(remove_sources) = cli_args.remove_sources {
            self.bundle.remove_sources = remove_sources;
        }

        if let Some(level) = cli_args.compression_level {
            self.bundle.compression_level = level;
        }

        if let Some(format) = cli_args.bundle_format {
            self.bundle.format = format;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| MirrorError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| MirrorError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_component("auxiliary directory", &self.archive.auxiliary_dir)?;

        if self.selection.tasks.is_empty() {
            return Err(MirrorError::Config {
                message: "At least one task must be specified".to_string(),
            });
        }

        if self.selection.sensors.is_empty() {
            return Err(MirrorError::Config {
                message: "At least one sensor must be specified".to_string(),
            });
        }

        for participant in &self.selection.participants {
            validate_component("participant", participant)?;
        }
        for task in &self.selection.tasks {
            validate_component("task", task)?;
        }
        for sensor in &self.selection.sensors {
            validate_component("sensor", sensor)?;
        }

        if let Some(ref pattern) = self.selection.participant_pattern {
            ParticipantFilter::new(Some(pattern), &self.output.suffix)?;
        }

        if self.output.suffix.is_empty() {
            return Err(MirrorError::Config {
                message: "Mirror suffix must not be empty".to_string(),
            });
        }

        // The suffix is glued onto a participant id to form one directory name.
        if self.output.suffix.contains(['/', '\\']) {
            return Err(MirrorError::Config {
                message: format!(
                    "Mirror suffix must not contain path separators: {}",
                    self.output.suffix
                ),
            });
        }

        if self.bundle.compression_level > 9 {
            return Err(MirrorError::Config {
                message: format!(
                    "Compression level must be between 0 and 9, got {}",
                    self.bundle.compression_level
                ),
            });
        }

        Ok(())
    }

    /// Defaults plus a participant pattern, as written by `init-config`.
    pub fn sample() -> Self {
        let mut sample_config = Self::default();
        sample_config.selection.participant_pattern = Some(r"^AB\d+$".to_string());
        sample_config
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub archive_root: Option<PathBuf>,
    pub auxiliary_dir: Option<String>,
    pub participants: Option<Vec<String>>,
    pub participant_pattern: Option<String>,
    pub tasks: Option<Vec<String>>,
    pub sensors: Option<Vec<String>>,
    pub mirror_root: Option<PathBuf>,
    pub atomic_copy: Option<bool>,
    pub write_report: Option<bool>,
    pub remove_sources: Option<bool>,
    pub compression_level: Option<u32>,
    pub bundle_format: Option<BundleFormat>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive_root(mut self, root: Option<PathBuf>) -> Self {
        self.archive_root = root;
        self
    }

    pub fn with_auxiliary_dir(mut self, name: Option<String>) -> Self {
        self.auxiliary_dir = name;
        self
    }

    pub fn with_participants(mut self, participants: Option<Vec<String>>) -> Self {
        self.participants = participants;
        self
    }

    pub fn with_participant_pattern(mut self, pattern: Option<String>) -> Self {
        self.participant_pattern = pattern;
        self
    }

    pub fn with_tasks(mut self, tasks: Option<Vec<String>>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_sensors(mut self, sensors: Option<Vec<String>>) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn with_mirror_root(mut self, mirror_root: Option<PathBuf>) -> Self {
        self.mirror_root = mirror_root;
        self
    }

    pub fn with_atomic_copy(mut self, atomic: Option<bool>) -> Self {
        self.atomic_copy = atomic;
        self
    }

    pub fn with_write_report(mut self, write_report: Option<bool>) -> Self {
        self.write_report = write_report;
        self
    }

    pub fn with_remove_sources(mut self, remove: Option<bool>) -> Self {
        self.remove_sources = remove;
        self
    }

    pub fn with_compression_level(mut self, level: Option<u32>) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_bundle_format(mut self, format: Option<BundleFormat>) -> Self {
        self.bundle_format = format;
        self
    }
}
