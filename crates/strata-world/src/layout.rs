//! On-disk layout of a world's map files.
//!
//! ```text
//! <world-root>/maps/<segX>.<segY>.<segZ>/<quadX>.<quadY>.<quadZ>.map
//! ```

use std::path::{Path, PathBuf};

use strata_common::{QuadCoord, SegmentCoord};

/// Directory under the world root that holds all segment directories.
pub const MAPS_DIR: &str = "maps";

/// Suffix of every quad file.
pub const QUAD_FILE_SUFFIX: &str = ".map";

/// Suffix of the temporary file a quad is written to before it is renamed
/// into place.
pub const TEMP_FILE_SUFFIX: &str = ".map.tmp";

/// Builds map file paths for one world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapLayout {
    world_root: PathBuf,
}

impl MapLayout {
    /// Creates a layout rooted at `world_root`.
    #[must_use]
    pub fn new(world_root: impl Into<PathBuf>) -> Self {
        Self {
            world_root: world_root.into(),
        }
    }

    /// Returns the world root.
    #[must_use]
    pub fn world_root(&self) -> &Path {
        &self.world_root
    }

    /// Returns the `maps` directory.
    #[must_use]
    pub fn maps_dir(&self) -> PathBuf {
        self.world_root.join(MAPS_DIR)
    }

    /// Returns the segment directory that holds `quad`.
    #[must_use]
    pub fn segment_dir(&self, quad: QuadCoord) -> PathBuf {
        self.maps_dir().join(segment_dir_name(quad.segment()))
    }

    /// Returns the canonical file path for `quad`.
    #[must_use]
    pub fn locate(&self, quad: QuadCoord) -> PathBuf {
        self.segment_dir(quad).join(quad_file_name(quad))
    }

    /// Returns the temporary path `quad` is written to before renaming.
    #[must_use]
    pub fn temp_path(&self, quad: QuadCoord) -> PathBuf {
        self.segment_dir(quad)
            .join(format!("{}.{}.{}{TEMP_FILE_SUFFIX}", quad.x, quad.y, quad.z))
    }
}

/// Name of a segment directory.
#[must_use]
pub fn segment_dir_name(segment: SegmentCoord) -> String {
    format!("{}.{}.{}", segment.x, segment.y, segment.z)
}

/// Canonical name of a quad file.
#[must_use]
pub fn quad_file_name(quad: QuadCoord) -> String {
    format!("{}.{}.{}{QUAD_FILE_SUFFIX}", quad.x, quad.y, quad.z)
}

/// Parses a canonical quad file name.
#[must_use]
pub fn parse_quad_file_name(name: &str) -> Option<QuadCoord> {
    let stem = name.strip_suffix(QUAD_FILE_SUFFIX)?;
    let mut parts = stem.split('.');
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(QuadCoord::new(x, y, z)).filter(|quad| quad.is_addressable())
}
