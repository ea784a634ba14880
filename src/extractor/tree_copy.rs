use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Name prefix of the hidden directories a copy is staged in before it is
/// renamed onto its final destination.
pub const STAGING_PREFIX: &str = ".sensormirror-staging-";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

impl CopyStats {
    pub fn absorb(&mut self, other: &CopyStats) {
        self.files += other.files;
        self.directories += other.directories;
        self.bytes += other.bytes;
    }
}

pub struct TreeCopier {
    atomic: bool,
    buffer_size: usize,
}

impl TreeCopier {
    pub fn new() -> Self {
        Self {
            atomic: true,
            buffer_size: 64 * 1024, // 64KB buffer
        }
    }

    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Copies the directory tree at `source` so that it becomes `dest`.
    ///
    /// `dest` must not exist. In atomic mode the tree is first copied into a
    /// staging directory beside `dest` and renamed into place, so a failed
    /// copy leaves nothing at `dest`.
    pub fn copy_tree(&self, source: &Path, dest: &Path) -> Result<CopyStats> {
        if !source.is_dir() {
            return Err(MirrorError::InvalidPath {
                path: format!("Source is not a directory: {}", source.display()),
            });
        }

        self.validate_destination_path(dest)?;

        if dest.exists() {
            return Err(MirrorError::DestinationExists {
                path: dest.display().to_string(),
            });
        }

        let parent = dest.parent().ok_or_else(|| MirrorError::InvalidPath {
            path: format!("Destination has no parent: {}", dest.display()),
        })?;
        fs::create_dir_all(parent)?;

        if !self.atomic {
            return self.copy_contents(source, dest);
        }

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)?;
        let staged = staging.path().join("tree");

        let stats = self.copy_contents(source, &staged)?;

        // Another writer may have claimed the destination meanwhile
        if dest.exists() {
            return Err(MirrorError::DestinationExists {
                path: dest.display().to_string(),
            });
        }

        fs::rename(&staged, dest)?;
        staging.close()?;

        Ok(stats)
    }

    fn copy_contents(&self, source: &Path, dest: &Path) -> Result<CopyStats> {
        let mut stats = CopyStats::default();

        // Symlinks are followed so the mirror holds real data, not links
        // pointing back into the archive.
        for entry in WalkDir::new(source).follow_links(true) {
            let entry = entry.map_err(std::io::Error::from)?;

            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|_| MirrorError::InvalidPath {
                    path: format!(
                        "Cannot calculate relative path for {} from {}",
                        entry.path().display(),
                        source.display()
                    ),
                })?;
            let target = dest.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
                stats.directories += 1;
            } else if entry.file_type().is_file() {
                stats.bytes += self.copy_file_with_buffer(entry.path(), &target)?;
                stats.files += 1;
            } else {
                tracing::warn!(path = %entry.path().display(), "Skipping special file");
            }
        }

        Ok(stats)
    }

    fn copy_file_with_buffer(&self, source: &Path, dest: &Path) -> Result<u64> {
        let source_file = fs::File::open(source)?;
        let dest_file = fs::File::create(dest)?;

        let mut reader = BufReader::with_capacity(self.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.buffer_size, dest_file);

        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; 8192];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            writer.write_all(&buffer[..bytes_read])?;
            total_bytes += bytes_read as u64;
        }

        writer.flush()?;

        // Keep the recording timestamps of the original files
        if let Ok(modified_time) = fs::metadata(source).and_then(|m| m.modified()) {
            let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(modified_time));
        }

        Ok(total_bytes)
    }

    fn validate_destination_path(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(MirrorError::InvalidPath {
                path: format!("Directory traversal not allowed: {}", path_str),
            });
        }

        check_path_length(path)
    }
}

impl Default for TreeCopier {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes staging directories left under `root` by an interrupted copy.
/// Returns how many were removed.
pub fn sweep_stale_staging(root: &Path) -> Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }

    let is_staging = |name: &std::ffi::OsStr| name.to_string_lossy().starts_with(STAGING_PREFIX);

    let mut stale = Vec::new();
    let mut walker = WalkDir::new(root).follow_links(false).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_dir() && is_staging(entry.file_name()) {
            stale.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }

    for path in &stale {
        tracing::info!(path = %path.display(), "Removing stale staging directory");
        fs::remove_dir_all(path)?;
    }

    Ok(stale.len())
}

pub fn check_path_length(path: &Path) -> Result<()> {
    let path_str = path.to_string_lossy();

    #[cfg(windows)]
    const MAX_PATH: usize = 260;

    #[cfg(not(windows))]
    const MAX_PATH: usize = 4096;

    if path_str.len() > MAX_PATH {
        Err(MirrorError::InvalidPath {
            path: format!(
                "Path too long: {} characters (max: {})",
                path_str.len(),
                MAX_PATH
            ),
        })
    } else {
        Ok(())
    }
}
