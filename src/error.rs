use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive root not found: {path}")]
    ArchiveRootNotFound { path: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid {kind} name: {name:?}")]
    InvalidName { kind: String, name: String },

    #[error("Invalid participant pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Permission denied: {path}")]
    Permission { path: String },

    #[error("Failed to write report: {message}")]
    Report { message: String },

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("Destination already exists: {path}")]
    DestinationExists { path: String },

    #[error("Invalid archive {path}: {message}")]
    InvalidArchive { path: String, message: String },
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for MirrorError {
    fn user_message(&self) -> String {
        match self {
            MirrorError::ArchiveRootNotFound { path } => {
                format!("Archive root does not exist or is not a directory: {}", path)
            }
            MirrorError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            MirrorError::InvalidName { kind, name } => {
                format!("'{}' is not a usable {} name", name, kind)
            }
            MirrorError::InvalidPattern { pattern, message } => {
                format!("Participant pattern '{}' does not compile: {}", pattern, message)
            }
            MirrorError::Permission { path } => {
                format!("Permission denied accessing: {}", path)
            }
            MirrorError::Report { message } => {
                format!("Could not write the run report: {}", message)
            }
            MirrorError::Cancelled => "Operation was cancelled by user".to_string(),
            MirrorError::InvalidPath { path } => {
                format!("Invalid path: {}", path)
            }
            MirrorError::DestinationExists { path } => {
                format!("Refusing to overwrite existing destination: {}", path)
            }
            MirrorError::InvalidArchive { path, message } => {
                format!("Cannot unpack {}: {}", path, message)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            MirrorError::ArchiveRootNotFound { .. } => Some(
                "Pass --archive-root or set [archive] root in the configuration file to the folder holding one directory per participant.".to_string()
            ),
            MirrorError::Config { .. } => Some(
                "Check your configuration file syntax, or run `sensormirror init-config` to start from a sample.".to_string()
            ),
            MirrorError::InvalidName { .. } => Some(
                "Names must be a single directory name: non-empty, without '/' or '\\', and not '.' or '..'.".to_string()
            ),
            MirrorError::InvalidPattern { .. } => Some(
                "Use Rust regex syntax, e.g. --participant-pattern '^AB\\d+$'.".to_string()
            ),
            MirrorError::Permission { .. } => Some(
                "Ensure you have read access to the archive and write access to the mirror root.".to_string()
            ),
            MirrorError::Report { .. } => Some(
                "The mirror itself was written; rerun with --no-report to skip the report files.".to_string()
            ),
            MirrorError::DestinationExists { .. } => Some(
                "Delete the existing destination before retrying, or choose another mirror root with --mirror-root.".to_string()
            ),
            MirrorError::InvalidArchive { .. } => Some(
                "An archive must hold exactly one top-level folder named after the archive, e.g. AB07.zip -> AB07/.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for MirrorError {
    fn from(error: toml::de::Error) -> Self {
        MirrorError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_friendly_messages() {
        let error = MirrorError::ArchiveRootNotFound {
            path: "parquet data".to_string(),
        };
        assert!(error.user_message().contains("parquet data"));
        assert!(error.suggestion().is_some());
    }

    #[test]
    fn test_cancelled_has_no_suggestion() {
        assert!(MirrorError::Cancelled.suggestion().is_none());
        assert_eq!(
            MirrorError::Cancelled.user_message(),
            "Operation was cancelled by user"
        );
    }

    #[test]
    fn test_invalid_archive_message() {
        let error = MirrorError::InvalidArchive {
            path: "AB07.tar.gz".to_string(),
            message: "expected a single top-level folder 'AB07', found [AB08]".to_string(),
        };
        assert!(error.user_message().contains("AB07.tar.gz"));
        assert!(error.suggestion().unwrap().contains("AB07/"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
        assert_eq!(format_bytes(500), "500 B");
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_error = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let error = MirrorError::from(toml_error);
        assert!(matches!(error, MirrorError::Config { .. }));
    }
}
