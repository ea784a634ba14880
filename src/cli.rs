use crate::archive::layout::is_valid_component;
use crate::bundle::BundleFormat;
use crate::config::{CliOverrides, Config};
use crate::error::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sensormirror")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mirror selected task/sensor data out of a biomechanics archive")]
#[command(
    long_about = "SensorMirror copies a chosen subset of tasks and sensors for each participant \
                  of a parquet sensor archive into a parallel <participant>_modified tree, \
                  leaving the source archive untouched."
)]
#[command(after_help = "EXAMPLES:\n  \
    sensormirror extract -p AB07 -t levelground,stair -s imu\n  \
    sensormirror extract --participant-pattern '^AB1\\d$' --mirror-root out\n  \
    sensormirror extract --dry-run\n  \
    sensormirror pack out --remove-sources\n  \
    sensormirror pack out --format zip\n  \
    sensormirror init-config")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mirror the selected tasks and sensors for one or more participants
    Extract(ExtractArgs),
    /// Pack every folder of a directory into its own .tar.gz or .zip
    Pack(PackArgs),
    /// Expand every .tar.gz and .zip of a directory in place
    Unpack(UnpackArgs),
    /// Write a sample configuration file
    InitConfig {
        /// Where to write the file
        #[arg(default_value = "sensormirror.toml")]
        path: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct ExtractArgs {
    /// Directory holding one subdirectory per participant
    #[arg(long, env = "SENSORMIRROR_ARCHIVE_ROOT")]
    pub archive_root: Option<PathBuf>,

    /// Directory under which <participant>_modified trees are created
    #[arg(short, long)]
    pub mirror_root: Option<PathBuf>,

    /// Participants to process (comma-separated)
    #[arg(short, long, value_delimiter = ',', value_parser = validate_name)]
    pub participants: Option<Vec<String>>,

    /// Regex selecting participants when none are listed
    #[arg(long)]
    pub participant_pattern: Option<String>,

    /// Tasks to mirror (comma-separated)
    #[arg(short, long, value_delimiter = ',', value_parser = validate_name)]
    pub tasks: Option<Vec<String>>,

    /// Sensors to mirror (comma-separated)
    #[arg(short, long, value_delimiter = ',', value_parser = validate_name)]
    pub sensors: Option<Vec<String>>,

    /// Name of the non-date directory inside each participant
    #[arg(long, value_parser = validate_name)]
    pub auxiliary_dir: Option<String>,

    /// Copy straight into the destination instead of staging first
    #[arg(long)]
    pub no_atomic: bool,

    /// Skip writing the JSON/text run report
    #[arg(long)]
    pub no_report: bool,

    /// Show which participants would be processed without copying
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Default)]
pub struct PackArgs {
    /// Directory whose folders are packed
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Delete each folder once its archive is written
    #[arg(long)]
    pub remove_sources: bool,

    /// Compression level (0-9)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=9))]
    pub level: Option<u32>,

    /// Archive format to write
    #[arg(long, value_enum)]
    pub format: Option<ArchiveFormat>,

    /// List what would be packed
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Default)]
pub struct UnpackArgs {
    /// Directory whose .tar.gz and .zip files are expanded
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Delete each archive once it is expanded
    #[arg(long)]
    pub remove_sources: bool,

    /// List what would be unpacked
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ArchiveFormat {
    /// Gzip-compressed tarball
    TarGz,
    /// Deflate-compressed zip
    Zip,
}

impl From<ArchiveFormat> for BundleFormat {
    fn from(format: ArchiveFormat) -> Self {
        match format {
            ArchiveFormat::TarGz => BundleFormat::TarGz,
            ArchiveFormat::Zip => BundleFormat::Zip,
        }
    }
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        match &self.command {
            Command::Extract(args) => CliOverrides::new()
                .with_archive_root(args.archive_root.clone())
                .with_mirror_root(args.mirror_root.clone())
                .with_participants(args.participants.clone())
                .with_participant_pattern(args.participant_pattern.clone())
                .with_tasks(args.tasks.clone())
                .with_sensors(args.sensors.clone())
                .with_auxiliary_dir(args.auxiliary_dir.clone())
                .with_atomic_copy(args.no_atomic.then_some(false))
                .with_write_report(args.no_report.then_some(false)),
            Command::Pack(args) => CliOverrides::new()
                .with_remove_sources(args.remove_sources.then_some(true))
                .with_compression_level(args.level)
                .with_bundle_format(args.format.map(BundleFormat::from)),
            Command::Unpack(args) => {
                CliOverrides::new().with_remove_sources(args.remove_sources.then_some(true))
            }
            Command::InitConfig { .. } => CliOverrides::new(),
        }
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

pub fn validate_name(s: &str) -> std::result::Result<String, String> {
    let trimmed = s.trim();
    if is_valid_component(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(format!(
            "'{}' must be a single directory name (no '/', '\\', '.' or '..')",
            s
        ))
    }
}
