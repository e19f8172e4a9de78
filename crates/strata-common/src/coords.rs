//! Coordinate types for chunk, quad, and segment positions.
//!
//! Three granularities share one horizontal plane per z-level:
//! - [`ChunkCoord`]: one chunk, the unit of caching
//! - [`QuadCoord`]: a 2x2 group of chunks, the unit of one map file
//! - [`SegmentCoord`]: a 32x32 group of quads, the unit of one directory
//!
//! Projections use Euclidean division so negative coordinates floor toward
//! negative infinity (chunk `-1` lives in quad `-1`, not quad `0`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Chunks along one horizontal edge of a quad.
pub const QUAD_SIZE: i32 = 2;

/// Quads along one horizontal edge of a segment.
pub const SEGMENT_SIZE: i32 = 32;

/// Chunk offsets inside a quad, in the order records are written.
pub const QUAD_SLOT_OFFSETS: [(i32, i32); 4] = [(0, 0), (0, 1), (1, 0), (1, 1)];

/// Absolute chunk coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// X coordinate in chunk space
    pub x: i32,
    /// Y coordinate in chunk space
    pub y: i32,
    /// Elevation
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the quad that stores this chunk.
    #[must_use]
    pub const fn quad(self) -> QuadCoord {
        QuadCoord {
            x: self.x.div_euclid(QUAD_SIZE),
            y: self.y.div_euclid(QUAD_SIZE),
            z: self.z,
        }
    }

    /// Returns the segment directory that holds this chunk's quad.
    #[must_use]
    pub const fn segment(self) -> SegmentCoord {
        self.quad().segment()
    }

    /// Returns this coordinate as an `[x, y, z]` triple.
    #[must_use]
    pub const fn to_array(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[i32; 3]> for ChunkCoord {
    fn from([x, y, z]: [i32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Quad coordinate: a 2x2 block of chunks stored in one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuadCoord {
    /// X coordinate in quad space
    pub x: i32,
    /// Y coordinate in quad space
    pub y: i32,
    /// Elevation
    pub z: i32,
}

impl QuadCoord {
    /// Creates a new quad coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the chunk at the quad's lowest x/y corner.
    #[must_use]
    pub const fn origin(self) -> ChunkCoord {
        ChunkCoord {
            x: self.x * QUAD_SIZE,
            y: self.y * QUAD_SIZE,
            z: self.z,
        }
    }

    /// Returns true if every chunk of this quad has a representable
    /// coordinate. Quads projected from a [`ChunkCoord`] always do.
    #[must_use]
    pub const fn is_addressable(self) -> bool {
        self.x.checked_mul(QUAD_SIZE).is_some() && self.y.checked_mul(QUAD_SIZE).is_some()
    }

    /// Returns the four chunks of this quad in slot order.
    #[must_use]
    pub fn chunks(self) -> [ChunkCoord; 4] {
        let origin = self.origin();
        QUAD_SLOT_OFFSETS.map(|(dx, dy)| ChunkCoord::new(origin.x + dx, origin.y + dy, origin.z))
    }

    /// Returns true if `chunk` belongs to this quad.
    #[must_use]
    pub const fn contains(self, chunk: ChunkCoord) -> bool {
        let q = chunk.quad();
        q.x == self.x && q.y == self.y && q.z == self.z
    }

    /// Returns the segment directory that holds this quad.
    #[must_use]
    pub const fn segment(self) -> SegmentCoord {
        SegmentCoord {
            x: self.x.div_euclid(SEGMENT_SIZE),
            y: self.y.div_euclid(SEGMENT_SIZE),
            z: self.z,
        }
    }
}

impl fmt::Display for QuadCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Segment coordinate: the coarse division used to name map directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentCoord {
    /// X coordinate in segment space
    pub x: i32,
    /// Y coordinate in segment space
    pub y: i32,
    /// Elevation
    pub z: i32,
}

impl SegmentCoord {
    /// Creates a new segment coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for SegmentCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
