use crate::archive::ParticipantFilter;
use crate::error::{MirrorError, Result};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Outcome of looking for the single date folder inside a participant.
/// `Found` keeps the raw name so non UTF-8 folders can still be joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateDirectory {
    Found(OsString),
    Ambiguous { candidates: Vec<String> },
}

/// Read-only view of an archive laid out as
/// `root/<participant>/<date>/<task>/<sensor>/...`.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    auxiliary_dir: String,
}

impl ArchiveLayout {
    pub fn new<P: Into<PathBuf>>(root: P, auxiliary_dir: &str) -> Result<Self> {
        let root = root.into();

        if !root.is_dir() {
            return Err(MirrorError::ArchiveRootNotFound {
                path: root.display().to_string(),
            });
        }

        validate_component("auxiliary directory", auxiliary_dir)?;

        Ok(Self {
            root,
            auxiliary_dir: auxiliary_dir.to_string(),
        })
    }

    pub fn with_auxiliary_dir<S: Into<String>>(mut self, name: S) -> Result<Self> {
        let name = name.into();
        validate_component("auxiliary directory", &name)?;
        self.auxiliary_dir = name;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn auxiliary_dir(&self) -> &str {
        &self.auxiliary_dir
    }

    pub fn participant_dir(&self, participant_id: &str) -> PathBuf {
        self.root.join(participant_id)
    }

    /// Lists the immediate subdirectories of `participant_dir`, leaving out
    /// the auxiliary directory. Exactly one survivor is the date directory.
    pub fn resolve_date_dir(&self, participant_dir: &Path) -> io::Result<DateDirectory> {
        let mut candidates = Vec::new();

        for entry in fs::read_dir(participant_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }

            let name = entry.file_name();
            if name == self.auxiliary_dir.as_str() {
                continue;
            }
            candidates.push(name);
        }

        candidates.sort();

        if candidates.len() == 1 {
            Ok(DateDirectory::Found(candidates.remove(0)))
        } else {
            Ok(DateDirectory::Ambiguous {
                candidates: candidates
                    .iter()
                    .map(|name| name.to_string_lossy().into_owned())
                    .collect(),
            })
        }
    }

    /// Participant directories under the root accepted by `filter`, sorted.
    pub fn discover_participants(&self, filter: &ParticipantFilter) -> Result<Vec<String>> {
        let mut participants = Vec::new();

        let entries = fs::read_dir(&self.root).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                MirrorError::Permission {
                    path: self.root.display().to_string(),
                }
            } else {
                MirrorError::Io(e)
            }
        })?;

        for entry in entries {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }

            // Non UTF-8 names cannot be passed back in as participant ids
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 directory name");
                continue;
            };

            if filter.is_participant(&name) {
                participants.push(name);
            }
        }

        participants.sort();
        tracing::debug!(count = participants.len(), "Discovered participants");

        Ok(participants)
    }
}

/// True when `name` is exactly one ordinary path component.
pub fn is_valid_component(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }

    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

pub fn validate_component(kind: &str, name: &str) -> Result<()> {
    if is_valid_component(name) {
        Ok(())
    } else {
        Err(MirrorError::InvalidName {
            kind: kind.to_string(),
            name: name.to_string(),
        })
    }
}
