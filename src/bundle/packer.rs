//! Packing every sibling folder of a directory into its own archive, and
//! the reverse. Used to move a whole database (or mirror) around.

use crate::error::{MirrorError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

const PARTIAL_PREFIX: &str = ".sensormirror-bundle-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleFormat {
    #[default]
    TarGz,
    Zip,
}

impl BundleFormat {
    pub const ALL: [BundleFormat; 2] = [BundleFormat::TarGz, BundleFormat::Zip];

    pub fn extension(self) -> &'static str {
        match self {
            BundleFormat::TarGz => ".tar.gz",
            BundleFormat::Zip => ".zip",
        }
    }

    /// Format implied by an archive file name, if any.
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| name.ends_with(format.extension()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleOperation {
    Pack,
    Unpack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleItem {
    pub name: String,
    pub archive: PathBuf,
    pub archive_bytes: u64,
    pub source_removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleFailure {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleReport {
    pub operation: BundleOperation,
    pub directory: PathBuf,
    pub completed: Vec<BundleItem>,
    pub failures: Vec<BundleFailure>,
    pub interrupted: bool,
    pub duration: Duration,
}

impl BundleReport {
    pub fn new(operation: BundleOperation, directory: PathBuf) -> Self {
        Self {
            operation,
            directory,
            completed: Vec::new(),
            failures: Vec::new(),
            interrupted: false,
            duration: Duration::ZERO,
        }
    }

    pub fn record(&mut self, name: &str, outcome: Result<BundleItem>) {
        match outcome {
            Ok(item) => self.completed.push(item),
            Err(e) => {
                tracing::warn!(item = name, error = %e, "Bundle item failed");
                self.failures.push(BundleFailure {
                    name: name.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    pub fn processed(&self) -> usize {
        self.completed.len() + self.failures.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct Bundler {
    remove_sources: bool,
    compression_level: u32,
    format: BundleFormat,
}

impl Bundler {
    pub fn new() -> Self {
        Self {
            remove_sources: false,
            compression_level: 6,
            format: BundleFormat::TarGz,
        }
    }

    pub fn with_remove_sources(mut self, remove: bool) -> Self {
        self.remove_sources = remove;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Archive format written by `pack_one`. Unpacking accepts every format.
    pub fn with_format(mut self, format: BundleFormat) -> Self {
        self.format = format;
        self
    }

    /// Non-hidden subdirectories of `dir`, sorted by name.
    pub fn pack_candidates(&self, dir: &Path) -> Result<Vec<String>> {
        list_names(dir, |path, name| path.is_dir() && !name.starts_with('.'))
    }

    /// `*.tar.gz` and `*.zip` files directly inside `dir`, sorted by name.
    pub fn unpack_candidates(&self, dir: &Path) -> Result<Vec<String>> {
        list_names(dir, |path, name| {
            path.is_file() && !name.starts_with('.') && BundleFormat::from_file_name(name).is_some()
        })
    }

    /// Packs `dir/name/` into `dir/name.<ext>` with entries rooted at `name/`.
    pub fn pack_one(&self, dir: &Path, name: &str) -> Result<BundleItem> {
        let source = dir.join(name);
        let archive_path = dir.join(format!("{}{}", name, self.format.extension()));

        if archive_path.exists() {
            return Err(MirrorError::DestinationExists {
                path: archive_path.display().to_string(),
            });
        }

        // Written beside the final archive and only renamed once complete
        let partial = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(".part")
            .tempfile_in(dir)?;
        match self.format {
            BundleFormat::TarGz => self.write_tar_gz(partial.as_file(), name, &source)?,
            BundleFormat::Zip => self
                .write_zip(partial.as_file(), name, &source)
                .map_err(|e| archive_error(&archive_path, e))?,
        }

        partial
            .persist_noclobber(&archive_path)
            .map_err(|e| MirrorError::Io(e.error))?;

        let archive_bytes = fs::metadata(&archive_path)?.len();

        if self.remove_sources {
            fs::remove_dir_all(&source)?;
        }

        tracing::info!(
            folder = name,
            size_bytes = archive_bytes,
            removed = self.remove_sources,
            "Folder packed"
        );

        Ok(BundleItem {
            name: name.to_string(),
            archive: archive_path,
            archive_bytes,
            source_removed: self.remove_sources,
        })
    }

    fn write_tar_gz(&self, file: &fs::File, name: &str, source: &Path) -> Result<()> {
        let encoder = GzEncoder::new(file, Compression::new(self.compression_level));
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(name, source)?;
        builder.into_inner()?.finish()?;
        Ok(())
    }

    fn write_zip(&self, file: &fs::File, name: &str, source: &Path) -> zip::result::ZipResult<()> {
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(self.compression_level as i32));
        let mut writer = zip::ZipWriter::new(file);

        for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());

            // Zip entry names always use '/' and are rooted at the folder name
            let mut entry_name = name.to_string();
            for component in relative.components() {
                entry_name.push('/');
                entry_name.push_str(&component.as_os_str().to_string_lossy());
            }

            if entry.file_type().is_dir() {
                writer.add_directory(entry_name, options)?;
            } else if entry.file_type().is_file() {
                writer.start_file(entry_name, options)?;
                io::copy(&mut fs::File::open(entry.path())?, &mut writer)?;
            }
        }

        writer.finish()?;
        Ok(())
    }

    /// Expands `dir/name` into `dir/<stem>/`. The archive is extracted into a
    /// hidden staging directory first and must hold exactly one top-level
    /// folder named after the archive; nothing outside `dir/<stem>` is touched.
    pub fn unpack_one(&self, dir: &Path, name: &str) -> Result<BundleItem> {
        let archive_path = dir.join(name);
        let format = BundleFormat::from_file_name(name).ok_or_else(|| MirrorError::InvalidArchive {
            path: archive_path.display().to_string(),
            message: "unknown archive extension".to_string(),
        })?;
        let folder = name.strip_suffix(format.extension()).unwrap_or(name);
        let target = dir.join(folder);

        if target.exists() {
            return Err(MirrorError::DestinationExists {
                path: target.display().to_string(),
            });
        }

        let archive_bytes = fs::metadata(&archive_path)?.len();
        let staging = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempdir_in(dir)?;

        let file = fs::File::open(&archive_path)?;
        match format {
            BundleFormat::TarGz => {
                let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
                archive.set_preserve_mtime(true);
                archive
                    .unpack(staging.path())
                    .map_err(|e| MirrorError::InvalidArchive {
                        path: archive_path.display().to_string(),
                        message: e.to_string(),
                    })?;
            }
            BundleFormat::Zip => {
                zip::ZipArchive::new(BufReader::new(file))
                    .and_then(|mut archive| archive.extract(staging.path()))
                    .map_err(|e| archive_error(&archive_path, e))?;
            }
        }

        let top_level = fs::read_dir(staging.path())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        let staged_folder = staging.path().join(folder);
        if top_level != [folder] || !staged_folder.is_dir() {
            return Err(MirrorError::InvalidArchive {
                path: archive_path.display().to_string(),
                message: format!(
                    "expected a single top-level folder '{}', found [{}]",
                    folder,
                    top_level.join(", ")
                ),
            });
        }

        // Another writer may have claimed the folder meanwhile
        if target.exists() {
            return Err(MirrorError::DestinationExists {
                path: target.display().to_string(),
            });
        }
        fs::rename(&staged_folder, &target)?;
        staging.close()?;

        if self.remove_sources {
            fs::remove_file(&archive_path)?;
        }

        tracing::info!(
            archive = name,
            size_bytes = archive_bytes,
            removed = self.remove_sources,
            "Archive unpacked"
        );

        Ok(BundleItem {
            name: folder.to_string(),
            archive: archive_path,
            archive_bytes,
            source_removed: self.remove_sources,
        })
    }

    /// Packs or unpacks every candidate of `dir` in name order.
    /// `before_item` sees each name first; returning `false` stops the run
    /// and marks the report interrupted.
    pub fn run<F>(&self, operation: BundleOperation, dir: &Path, mut before_item: F) -> Result<BundleReport>
    where
        F: FnMut(&str) -> bool,
    {
        let start = Instant::now();
        let mut report = BundleReport::new(operation, dir.to_path_buf());

        let names = match operation {
            BundleOperation::Pack => self.pack_candidates(dir)?,
            BundleOperation::Unpack => self.unpack_candidates(dir)?,
        };

        for name in &names {
            if !before_item(name) {
                report.interrupted = true;
                break;
            }

            let outcome = match operation {
                BundleOperation::Pack => self.pack_one(dir, name),
                BundleOperation::Unpack => self.unpack_one(dir, name),
            };
            report.record(name, outcome);
        }

        report.duration = start.elapsed();
        Ok(report)
    }
}

impl Default for Bundler {
    fn default() -> Self {
        Self::new()
    }
}

fn archive_error(path: &Path, error: zip::result::ZipError) -> MirrorError {
    match error {
        zip::result::ZipError::Io(e) if e.kind() != io::ErrorKind::InvalidData => MirrorError::Io(e),
        other => MirrorError::InvalidArchive {
            path: path.display().to_string(),
            message: other.to_string(),
        },
    }
}

fn list_names<F>(dir: &Path, keep: F) -> Result<Vec<String>>
where
    F: Fn(&Path, &str) -> bool,
{
    if !dir.is_dir() {
        return Err(MirrorError::InvalidPath {
            path: format!("{} is not a directory", dir.display()),
        });
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if keep(&path, &name) {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_folders(root: &Path) {
        for (folder, file, content) in [
            ("AB07", "2020_01_01/stair/imu/t1.parquet", "imu data"),
            ("AB08", "2020_02_02/ramp/gcRight/t1.parquet", "gait cycle"),
        ] {
            let path = root.join(folder).join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("notes.txt"), "loose file").unwrap();
    }

    fn pack_all(bundler: &Bundler, dir: &Path) -> BundleReport {
        bundler.run(BundleOperation::Pack, dir, |_| true).unwrap()
    }

    fn unpack_all(bundler: &Bundler, dir: &Path) -> BundleReport {
        bundler.run(BundleOperation::Unpack, dir, |_| true).unwrap()
    }

    /// A tar.gz named `archive_name` whose single file lives at `entry_path`.
    fn write_tar_gz(dir: &Path, archive_name: &str, entry_path: &str, content: &str) {
        let file = fs::File::create(dir.join(archive_name)).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, entry_path, content.as_bytes())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(BundleFormat::from_file_name("AB07.tar.gz"), Some(BundleFormat::TarGz));
        assert_eq!(BundleFormat::from_file_name("AB07.zip"), Some(BundleFormat::Zip));
        assert_eq!(BundleFormat::from_file_name("AB07.tar"), None);
    }

    #[test]
    fn test_pack_candidates() {
        let temp_dir = TempDir::new().unwrap();
        create_folders(temp_dir.path());

        let names = Bundler::new().pack_candidates(temp_dir.path()).unwrap();
        assert_eq!(names, vec!["AB07", "AB08"]);
    }

    #[test]
    fn test_pack_then_unpack_restores_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_folders(root);

        let bundler = Bundler::new().with_remove_sources(true);
        let packed = pack_all(&bundler, root);

        assert_eq!(packed.completed.len(), 2);
        assert!(!packed.has_failures());
        assert!(root.join("AB07.tar.gz").is_file());
        assert!(!root.join("AB07").exists());
        assert!(root.join(".hidden").exists());

        let unpacked = unpack_all(&bundler, root);
        assert_eq!(unpacked.completed.len(), 2);
        assert!(!root.join("AB07.tar.gz").exists());
        assert_eq!(
            fs::read_to_string(root.join("AB08/2020_02_02/ramp/gcRight/t1.parquet")).unwrap(),
            "gait cycle"
        );
    }

    #[test]
    fn test_zip_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_folders(root);

        let bundler = Bundler::new()
            .with_format(BundleFormat::Zip)
            .with_remove_sources(true);
        let packed = pack_all(&bundler, root);

        assert_eq!(packed.completed.len(), 2);
        assert!(root.join("AB07.zip").is_file());
        assert!(!root.join("AB07").exists());

        let unpacked = unpack_all(&bundler, root);
        assert_eq!(unpacked.completed.len(), 2, "failures: {:?}", unpacked.failures);
        assert!(!root.join("AB07.zip").exists());
        assert_eq!(
            fs::read_to_string(root.join("AB07/2020_01_01/stair/imu/t1.parquet")).unwrap(),
            "imu data"
        );
    }

    #[test]
    fn test_unpacks_zip_rooted_at_folder_name() {
        let temp_dir = TempDir::new().unwrap();
        let file = fs::File::create(temp_dir.path().join("AB09.zip")).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("AB09/2021_01_01/ramp/imu/t1.parquet", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"ramp imu").unwrap();
        writer.finish().unwrap();

        let report = unpack_all(&Bundler::new(), temp_dir.path());

        assert!(!report.has_failures(), "failures: {:?}", report.failures);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("AB09/2021_01_01/ramp/imu/t1.parquet"))
                .unwrap(),
            "ramp imu"
        );
        assert!(temp_dir.path().join("AB09.zip").exists());
    }

    #[test]
    fn test_pack_keeps_sources_by_default() {
        let temp_dir = TempDir::new().unwrap();
        create_folders(temp_dir.path());

        let report = pack_all(&Bundler::new(), temp_dir.path());

        assert!(report.completed.iter().all(|item| !item.source_removed));
        assert!(temp_dir.path().join("AB07").is_dir());
        assert!(temp_dir.path().join("AB07.tar.gz").is_file());
    }

    #[test]
    fn test_existing_archive_is_per_item_failure() {
        let temp_dir = TempDir::new().unwrap();
        create_folders(temp_dir.path());
        fs::write(temp_dir.path().join("AB07.tar.gz"), "previous").unwrap();

        let report = pack_all(&Bundler::new(), temp_dir.path());

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "AB07");
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("AB07.tar.gz")).unwrap(),
            "previous"
        );
    }

    #[test]
    fn test_unpack_refuses_existing_folder() {
        let temp_dir = TempDir::new().unwrap();
        create_folders(temp_dir.path());

        let bundler = Bundler::new();
        bundler.pack_one(temp_dir.path(), "AB07").unwrap();

        // AB07 still exists because sources were kept
        let result = bundler.unpack_one(temp_dir.path(), "AB07.tar.gz");
        assert!(matches!(result, Err(MirrorError::DestinationExists { .. })));
        assert!(temp_dir.path().join("AB07.tar.gz").exists());
    }

    #[test]
    fn test_unpack_never_writes_outside_named_folder() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("AB08")).unwrap();
        fs::write(root.join("AB08/data.parquet"), "ORIGINAL").unwrap();
        write_tar_gz(root, "AB07.tar.gz", "AB08/data.parquet", "FROM ARCHIVE");

        let report = unpack_all(&Bundler::new().with_remove_sources(true), root);

        assert!(report.completed.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "AB07.tar.gz");
        assert_eq!(
            fs::read_to_string(root.join("AB08/data.parquet")).unwrap(),
            "ORIGINAL"
        );
        assert!(!root.join("AB07").exists());
        assert!(root.join("AB07.tar.gz").exists());

        let leftovers: Vec<_> = fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(PARTIAL_PREFIX))
            .collect();
        assert!(leftovers.is_empty(), "staging left behind: {:?}", leftovers);
    }

    #[test]
    fn test_unpack_rejects_extra_top_level_entries() {
        let temp_dir = TempDir::new().unwrap();
        write_tar_gz(temp_dir.path(), "AB07.tar.gz", "stray.txt", "loose");

        let result = Bundler::new().unpack_one(temp_dir.path(), "AB07.tar.gz");

        assert!(matches!(result, Err(MirrorError::InvalidArchive { .. })));
        assert!(!temp_dir.path().join("stray.txt").exists());
        assert!(!temp_dir.path().join("AB07").exists());
    }

    #[test]
    fn test_corrupt_archive_recorded() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("broken.tar.gz"), "not gzip at all").unwrap();
        fs::write(temp_dir.path().join("broken2.zip"), "not zip at all").unwrap();

        let report = unpack_all(&Bundler::new().with_remove_sources(true), temp_dir.path());

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].name, "broken.tar.gz");
        assert!(temp_dir.path().join("broken.tar.gz").exists());
        assert!(temp_dir.path().join("broken2.zip").exists());
    }

    #[test]
    fn test_run_stops_when_callback_declines() {
        let temp_dir = TempDir::new().unwrap();
        create_folders(temp_dir.path());

        let mut seen = Vec::new();
        let report = Bundler::new()
            .run(BundleOperation::Pack, temp_dir.path(), |name| {
                seen.push(name.to_string());
                seen.len() < 2
            })
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.processed(), 1);
        assert_eq!(seen, vec!["AB07", "AB08"]);
        assert!(!temp_dir.path().join("AB08.tar.gz").exists());
    }

    #[test]
    fn test_missing_directory_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Bundler::new().run(BundleOperation::Pack, &temp_dir.path().join("absent"), |_| true);
        assert!(matches!(result, Err(MirrorError::InvalidPath { .. })));
    }
}
