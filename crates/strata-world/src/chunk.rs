//! Chunk contract consumed by the cache and the quad codec.
//!
//! The cache never interprets chunk content. It asks two questions (is the
//! chunk uniform, has it reverted to uniform since it was last written) and
//! hands the chunk a [`PayloadWriter`] on save and one member at a time on
//! load.

use serde::Serialize;
use serde_json::{Map, Value};
use strata_common::ChunkCoord;
use thiserror::Error;

use crate::terrain::TerrainClass;

/// Record members owned by the codec; chunk payloads may not use them.
pub const RESERVED_MEMBERS: [&str; 2] = ["version", "coordinates"];

/// Chunk payload errors.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Payload tried to write a member the record header owns
    #[error("Payload member `{0}` is reserved")]
    ReservedMember(String),
    /// Payload value could not be encoded
    #[error("Failed to encode payload member `{name}`: {source}")]
    Encode {
        /// Member name
        name: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
    /// Payload member could not be decoded
    #[error("Invalid payload member `{name}`: {reason}")]
    Invalid {
        /// Member name
        name: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Result type for payload operations.
pub type PayloadResult<T> = Result<T, PayloadError>;

/// A fixed-size unit of world content.
///
/// Implemented by the embedding game. Chunks are read from several save
/// workers at once, hence the `Send + Sync` bound.
pub trait Chunk: Send + Sync + Sized {
    /// Creates an empty chunk that record members are loaded into.
    fn blank() -> Self;

    /// Creates the uniform chunk implied by `terrain` at `coord`.
    fn uniform(coord: ChunkCoord, terrain: &TerrainClass) -> Self;

    /// Returns true if the chunk is fully described by its terrain class.
    fn is_uniform(&self) -> bool;

    /// Returns true if the chunk became uniform after having been written as
    /// non-uniform.
    fn is_reverted(&self) -> bool;

    /// Writes the payload members of this chunk.
    fn store(&self, out: &mut PayloadWriter) -> PayloadResult<()>;

    /// Called once per record, before any payload member, with the format
    /// version the record was written at.
    fn record_version(&mut self, _version: u32) {}

    /// Applies one payload member read from a record written at `version`.
    fn load_member(&mut self, name: &str, value: Value, version: u32) -> PayloadResult<()>;
}

/// Collects the payload members of one chunk record.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    members: Map<String, Value>,
}

impl PayloadWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one payload member.
    pub fn member<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> PayloadResult<()> {
        if RESERVED_MEMBERS.contains(&name) {
            return Err(PayloadError::ReservedMember(name.to_string()));
        }
        let value = serde_json::to_value(value).map_err(|source| PayloadError::Encode {
            name: name.to_string(),
            source,
        })?;
        self.members.insert(name.to_string(), value);
        Ok(())
    }

    /// Returns the members written so far.
    pub(crate) fn into_members(self) -> Map<String, Value> {
        self.members
    }
}

/// A chunk that keeps its payload members verbatim.
///
/// Used by tools that move map files around without understanding their
/// content, and as the reference [`Chunk`] implementation. A chunk with no
/// payload members is uniform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawChunk {
    members: Map<String, Value>,
    terrain: Option<String>,
    reverted: bool,
    loaded_version: Option<u32>,
}

impl RawChunk {
    /// Creates an empty, uniform chunk.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style member insertion.
    #[must_use]
    pub fn with_member(mut self, name: &str, value: Value) -> Self {
        self.set_member(name, value);
        self
    }

    /// Sets a payload member, making the chunk non-uniform.
    pub fn set_member(&mut self, name: &str, value: Value) {
        self.members.insert(name.to_string(), value);
        self.reverted = false;
    }

    /// Returns a payload member.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    /// Returns all payload members.
    #[must_use]
    pub fn members(&self) -> &Map<String, Value> {
        &self.members
    }

    /// Terrain class this chunk was synthesized from, if any.
    #[must_use]
    pub fn terrain(&self) -> Option<&str> {
        self.terrain.as_deref()
    }

    /// Record version this chunk was loaded from, if it came from disk.
    #[must_use]
    pub const fn loaded_version(&self) -> Option<u32> {
        self.loaded_version
    }

    /// Drops all payload members.
    ///
    /// A chunk that had content is flagged as reverted so the next save
    /// removes its stale quad file.
    pub fn revert_to_uniform(&mut self) {
        if !self.members.is_empty() {
            self.members.clear();
            self.reverted = true;
        }
    }

    /// Flags a uniform chunk so the next save removes its quad file, for
    /// files that hold nothing but uniform records.
    pub fn force_tombstone(&mut self) {
        if self.members.is_empty() {
            self.reverted = true;
        }
    }
}

impl Chunk for RawChunk {
    fn blank() -> Self {
        Self::new()
    }

    fn uniform(_coord: ChunkCoord, terrain: &TerrainClass) -> Self {
        Self {
            terrain: Some(terrain.id.clone()),
            ..Self::default()
        }
    }

    fn is_uniform(&self) -> bool {
        self.members.is_empty()
    }

    fn is_reverted(&self) -> bool {
        self.reverted
    }

    fn store(&self, out: &mut PayloadWriter) -> PayloadResult<()> {
        for (name, value) in &self.members {
            out.member(name, value)?;
        }
        Ok(())
    }

    fn record_version(&mut self, version: u32) {
        self.loaded_version = Some(version);
    }

    fn load_member(&mut self, name: &str, value: Value, _version: u32) -> PayloadResult<()> {
        self.members.insert(name.to_string(), value);
        Ok(())
    }
}
