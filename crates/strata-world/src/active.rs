//! The active working set: the part of the world currently in play.

use strata_common::{ChunkCoord, QuadCoord};

/// Answers whether a location is inside the active working set.
pub trait ActiveArea: Sync {
    /// Returns true if `chunk` is active.
    fn contains_chunk(&self, chunk: ChunkCoord) -> bool;

    /// Returns true if any chunk of `quad` is active.
    fn contains_quad(&self, quad: QuadCoord) -> bool {
        quad.chunks().into_iter().any(|c| self.contains_chunk(c))
    }
}

impl<F> ActiveArea for F
where
    F: Fn(ChunkCoord) -> bool + Sync,
{
    fn contains_chunk(&self, chunk: ChunkCoord) -> bool {
        self(chunk)
    }
}

/// Every location is active.
#[derive(Debug, Clone, Copy, Default)]
pub struct Everything;

impl ActiveArea for Everything {
    fn contains_chunk(&self, _chunk: ChunkCoord) -> bool {
        true
    }

    fn contains_quad(&self, _quad: QuadCoord) -> bool {
        true
    }
}

/// No location is active.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nothing;

impl ActiveArea for Nothing {
    fn contains_chunk(&self, _chunk: ChunkCoord) -> bool {
        false
    }

    fn contains_quad(&self, _quad: QuadCoord) -> bool {
        false
    }
}

/// Inclusive box of chunks, the usual shape of a loaded map around the
/// player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveBox {
    /// Lowest corner
    pub min: ChunkCoord,
    /// Highest corner
    pub max: ChunkCoord,
}

impl ActiveBox {
    /// Creates a box from two corners in any order.
    #[must_use]
    pub fn new(a: ChunkCoord, b: ChunkCoord) -> Self {
        Self {
            min: ChunkCoord::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: ChunkCoord::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Creates a box of `radius` chunks around `center` spanning the given
    /// z-levels.
    #[must_use]
    pub fn around(center: ChunkCoord, radius: i32, z_min: i32, z_max: i32) -> Self {
        Self::new(
            ChunkCoord::new(center.x - radius, center.y - radius, z_min),
            ChunkCoord::new(center.x + radius, center.y + radius, z_max),
        )
    }
}

impl ActiveArea for ActiveBox {
    fn contains_chunk(&self, c: ChunkCoord) -> bool {
        (self.min.x..=self.max.x).contains(&c.x)
            && (self.min.y..=self.max.y).contains(&c.y)
            && (self.min.z..=self.max.z).contains(&c.z)
    }
}
