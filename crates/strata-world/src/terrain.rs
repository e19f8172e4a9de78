//! Terrain classification consulted when synthesizing uniform chunks.

use strata_common::QuadCoord;

/// Default terrain at one quad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerrainClass {
    /// Terrain type id
    pub id: String,
    /// Whether chunks of this terrain are fully described by it
    pub uniform: bool,
}

impl TerrainClass {
    /// Terrain whose chunks never need storing.
    #[must_use]
    pub fn uniform(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uniform: true,
        }
    }

    /// Terrain whose chunks must be generated and stored.
    #[must_use]
    pub fn varied(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uniform: false,
        }
    }
}

/// Looks up the default terrain class of a quad.
pub trait TerrainLookup: Send + Sync {
    /// Returns the terrain class at `quad`.
    fn terrain_at(&self, quad: QuadCoord) -> TerrainClass;
}

impl<F> TerrainLookup for F
where
    F: Fn(QuadCoord) -> TerrainClass + Send + Sync,
{
    fn terrain_at(&self, quad: QuadCoord) -> TerrainClass {
        self(quad)
    }
}

/// The same terrain class everywhere.
#[derive(Debug, Clone)]
pub struct FlatTerrain(pub TerrainClass);

impl TerrainLookup for FlatTerrain {
    fn terrain_at(&self, _quad: QuadCoord) -> TerrainClass {
        self.0.clone()
    }
}
