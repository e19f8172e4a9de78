//! Error types for Project Strata.

use thiserror::Error;

use crate::coords::{ChunkCoord, QuadCoord};

/// Chunk residency and integrity errors.
///
/// None of these are fatal: callers log them and carry on with an absent
/// result.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Removal of a chunk that is not resident
    #[error("Tried to remove non-existing chunk {0}")]
    NotResident(ChunkCoord),

    /// A chunk coordinate was inserted twice
    #[error("Chunk {0} was already loaded")]
    AlreadyLoaded(ChunkCoord),

    /// A quad file did not contain the chunk its terrain requires
    #[error(
        "Quad {quad} did not contain the expected chunk {chunk} for non-uniform terrain {terrain}"
    )]
    MissingExpectedChunk {
        /// Quad that was loaded
        quad: QuadCoord,
        /// Chunk that was requested
        chunk: ChunkCoord,
        /// Terrain class id at the quad
        terrain: String,
    },
}

/// Result type alias for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
