//! In-memory chunk cache backed by quad files.
//!
//! The cache exclusively owns every resident chunk. A miss loads the whole
//! quad the chunk belongs to; chunks that are implied by uniform terrain are
//! synthesized instead of read.

use std::collections::hash_map::Entry;
use std::path::Path;

use strata_common::{ChunkCoord, QuadCoord, WorldError, WorldResult};
use tracing::{debug, error, warn};

use crate::active::ActiveArea;
use crate::chunk::Chunk;
use crate::codec::{self, ChunkMap, CodecResult};
use crate::config::MapConfig;
use crate::layout::MapLayout;
use crate::terrain::{TerrainClass, TerrainLookup};

/// Resident chunks of one world, loaded lazily from its map files.
pub struct ChunkCache<C: Chunk> {
    pub(crate) chunks: ChunkMap<C>,
    pub(crate) layout: MapLayout,
    pub(crate) config: MapConfig,
    terrain: Box<dyn TerrainLookup>,
}

impl<C: Chunk> ChunkCache<C> {
    /// Creates an empty cache for the world described by `config`.
    pub fn new(config: MapConfig, terrain: impl TerrainLookup + 'static) -> Self {
        Self {
            chunks: ChunkMap::default(),
            layout: MapLayout::new(config.world_root.clone()),
            config,
            terrain: Box::new(terrain),
        }
    }

    /// Returns the file layout of this world.
    #[must_use]
    pub fn layout(&self) -> &MapLayout {
        &self.layout
    }

    /// Returns the configuration this cache was created with.
    #[must_use]
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Number of resident chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if no chunk is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Returns true if `coord` is resident, without loading anything.
    #[must_use]
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Returns a resident chunk without loading anything.
    #[must_use]
    pub fn get(&self, coord: ChunkCoord) -> Option<&C> {
        self.chunks.get(&coord)
    }

    /// Returns a resident chunk mutably without loading anything.
    pub fn get_mut(&mut self, coord: ChunkCoord) -> Option<&mut C> {
        self.chunks.get_mut(&coord)
    }

    /// Iterates over resident chunk coordinates.
    pub fn coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.chunks.keys().copied()
    }

    /// Returns the chunk at `coord`, loading its quad on a miss.
    ///
    /// `None` means the chunk has to be generated: either no file holds it,
    /// or loading failed (logged).
    pub fn lookup(&mut self, coord: ChunkCoord) -> Option<&mut C> {
        if !self.chunks.contains_key(&coord) && !self.load_for(coord) {
            return None;
        }
        self.chunks.get_mut(&coord)
    }

    /// Returns true if `coord` is resident or can be loaded.
    pub fn exists(&mut self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord) || self.load_for(coord)
    }

    /// Takes ownership of `chunk` at `coord`.
    ///
    /// An occupied coordinate is never overwritten; the chunk is handed back
    /// instead.
    pub fn insert(&mut self, coord: ChunkCoord, chunk: C) -> Result<(), C> {
        match self.chunks.entry(coord) {
            Entry::Occupied(_) => Err(chunk),
            Entry::Vacant(slot) => {
                slot.insert(chunk);
                Ok(())
            },
        }
    }

    /// Evicts the chunk at `coord` and returns it.
    pub fn remove(&mut self, coord: ChunkCoord) -> WorldResult<C> {
        self.chunks.remove(&coord).ok_or_else(|| {
            let err = WorldError::NotResident(coord);
            error!("{err}");
            err
        })
    }

    /// Evicts every chunk outside `area`. Returns the number evicted.
    pub fn evict_outside<A: ActiveArea + ?Sized>(&mut self, area: &A) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|coord, _| area.contains_chunk(*coord));
        let evicted = before - self.chunks.len();
        debug!("Evicted {evicted} chunks outside the active area");
        evicted
    }

    /// Drops every resident chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    fn load_for(&mut self, coord: ChunkCoord) -> bool {
        match self.load_quad(coord) {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to load chunk {coord}: {e}");
                false
            },
        }
    }

    /// Loads every chunk stored for `quad`, plus the uniform chunks its
    /// terrain implies. Returns the number of chunks that became resident.
    pub fn preload_quad(&mut self, quad: QuadCoord) -> CodecResult<usize> {
        let before = self.chunks.len();
        let terrain = self.terrain.terrain_at(quad);
        if let Some(path) = codec::find_quad_file(&self.layout, quad) {
            self.read_into_cache(&path, quad)?;
        }
        if terrain.uniform {
            self.synthesize_uniform(quad, &terrain);
        }
        Ok(self.chunks.len() - before)
    }

    /// Loads the quad holding `coord` and fills in its uniform chunks.
    ///
    /// Returns false when there is nothing to load and the terrain does not
    /// imply the chunk.
    fn load_quad(&mut self, coord: ChunkCoord) -> CodecResult<bool> {
        let quad = coord.quad();
        let terrain = self.terrain.terrain_at(quad);

        let Some(path) = codec::find_quad_file(&self.layout, quad) else {
            if !terrain.uniform {
                debug!("No file for quad {quad}, chunk {coord} needs generating");
                return Ok(false);
            }
            let synthesized = self.synthesize_uniform(quad, &terrain);
            debug!("Synthesized {synthesized} uniform chunks of quad {quad} ({})", terrain.id);
            return Ok(true);
        };

        self.read_into_cache(&path, quad)?;
        if terrain.uniform {
            self.synthesize_uniform(quad, &terrain);
        }
        if !self.chunks.contains_key(&coord) {
            return Err(WorldError::MissingExpectedChunk {
                quad,
                chunk: coord,
                terrain: terrain.id,
            }
            .into());
        }
        Ok(true)
    }

    /// Inserts every record of the file at `path`; resident chunks win over
    /// duplicates.
    ///
    /// The whole file is decoded before anything becomes resident, so a file
    /// that fails partway leaves the cache untouched.
    fn read_into_cache(&mut self, path: &Path, quad: QuadCoord) -> CodecResult<usize> {
        let mut decoded = Vec::new();
        let records = codec::read_quad_file::<C, _>(path, |loaded, chunk| {
            decoded.push((loaded, chunk));
        })?;
        for (loaded, chunk) in decoded {
            match self.chunks.entry(loaded) {
                Entry::Occupied(_) => warn!("{}", WorldError::AlreadyLoaded(loaded)),
                Entry::Vacant(slot) => {
                    slot.insert(chunk);
                },
            }
        }
        debug!("Loaded {records} chunks of quad {quad} from {}", path.display());
        Ok(records)
    }

    /// Inserts uniform chunks into the empty slots of `quad`.
    fn synthesize_uniform(&mut self, quad: QuadCoord, terrain: &TerrainClass) -> usize {
        let mut synthesized = 0;
        for coord in quad.chunks() {
            if let Entry::Vacant(slot) = self.chunks.entry(coord) {
                slot.insert(C::uniform(coord, terrain));
                synthesized += 1;
            }
        }
        synthesized
    }
}
