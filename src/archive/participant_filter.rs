use crate::error::{MirrorError, Result};
use regex::Regex;

/// Decides which directories under the archive root count as participants
/// when no explicit participant list is given.
pub struct ParticipantFilter {
    pattern: Option<Regex>,
    mirror_suffix: String,
}

impl ParticipantFilter {
    pub fn new(pattern: Option<&str>, mirror_suffix: &str) -> Result<Self> {
        let pattern = match pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| MirrorError::InvalidPattern {
                pattern: p.to_string(),
                message: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            pattern,
            mirror_suffix: mirror_suffix.to_string(),
        })
    }

    pub fn is_participant(&self, dir_name: &str) -> bool {
        // Hidden directories hold tool state, never participants
        if dir_name.starts_with('.') {
            return false;
        }

        // A mirror written next to the archive must not be picked up again
        if !self.mirror_suffix.is_empty() && dir_name.ends_with(&self.mirror_suffix) {
            return false;
        }

        match self.pattern {
            Some(ref pattern) => pattern.is_match(dir_name),
            None => true,
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(|p| p.as_str())
    }
}

impl Default for ParticipantFilter {
    fn default() -> Self {
        Self {
            pattern: None,
            mirror_suffix: "_modified".to_string(),
        }
    }
}
