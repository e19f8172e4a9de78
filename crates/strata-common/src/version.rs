//! Map file format versioning.

use std::cmp::Ordering;

/// Format revision written on every chunk record.
///
/// Bump this whenever a chunk payload field changes meaning; readers hand the
/// stored value to the chunk so it can migrate older payloads.
pub const MAP_FORMAT_VERSION: u32 = 3;

/// Version assumed for records written before versioning existed.
pub const UNVERSIONED: u32 = 0;

/// How a stored record version relates to [`MAP_FORMAT_VERSION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    /// Written by this format revision.
    Current,
    /// Written by an older revision; the chunk migrates it.
    Older,
    /// Written by a newer build than this one.
    Newer,
}

impl VersionStatus {
    /// Classifies a stored record version.
    #[must_use]
    pub fn of(version: u32) -> Self {
        match version.cmp(&MAP_FORMAT_VERSION) {
            Ordering::Less => Self::Older,
            Ordering::Equal => Self::Current,
            Ordering::Greater => Self::Newer,
        }
    }

    /// Returns true if the record needs migrating forward.
    #[must_use]
    pub const fn needs_migration(self) -> bool {
        matches!(self, Self::Older)
    }
}
