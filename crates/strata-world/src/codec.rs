//! Quad file codec.
//!
//! A quad file is a JSON array of chunk records:
//!
//! ```json
//! [
//!   { "version": 3, "coordinates": [4, 6, 0], "terrain": ["t_dirt"] },
//!   { "version": 3, "coordinates": [4, 7, 0], "furniture": [] }
//! ]
//! ```
//!
//! Records are streamed one at a time in both directions. Uniform chunks are
//! never written: a quad whose resident chunks are all uniform has no file,
//! and a stale file left behind by a chunk that reverted to uniform is
//! deleted on the next save.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use serde::de::{self, DeserializeSeed, SeqAccess, Visitor};
use serde::ser::{self, SerializeMap, SerializeSeq};
use serde::{Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use strata_common::{
    ChunkCoord, QuadCoord, VersionStatus, WorldError, MAP_FORMAT_VERSION, UNVERSIONED,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::chunk::{Chunk, PayloadError, PayloadWriter};
use crate::layout::MapLayout;
use crate::legacy;

/// Resident chunks keyed by coordinate.
pub(crate) type ChunkMap<C> = AHashMap<ChunkCoord, C>;

/// Quad file errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Filesystem operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// File content is not a valid quad file
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
    /// Records could not be encoded
    #[error("Failed to encode {}: {source}", path.display())]
    Encode {
        /// File being written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
    /// Loaded data contradicts what the world expects
    #[error(transparent)]
    Integrity(#[from] WorldError),
}

impl CodecError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Problems with a single chunk record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// `version` is not an unsigned 32-bit integer
    #[error("invalid record version {0}")]
    BadVersion(Value),
    /// Record has no `coordinates` member
    #[error("record has no coordinates")]
    MissingCoordinates,
    /// `coordinates` is not an array of three integers
    #[error("invalid record coordinates {0}")]
    BadCoordinates(Value),
    /// The chunk rejected a payload member
    #[error("chunk {coord}: {source}")]
    Payload {
        /// Record coordinate
        coord: ChunkCoord,
        /// Underlying error
        #[source]
        source: PayloadError,
    },
}

/// What saving one quad did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadOutcome {
    /// All resident chunks were uniform; nothing touched on disk.
    Skipped,
    /// File written with this many records.
    Written(usize),
    /// All resident chunks were uniform and a stale file was removed.
    Tombstoned,
}

/// Result of saving one quad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuadSave {
    /// What happened on disk
    pub outcome: QuadOutcome,
    /// Chunks that are safe to evict now that the quad is persisted
    pub evict: Vec<ChunkCoord>,
}

/// Finds the file holding `quad`, preferring the canonical name over legacy
/// locale-formatted names.
#[must_use]
pub fn find_quad_file(layout: &MapLayout, quad: QuadCoord) -> Option<PathBuf> {
    let path = layout.locate(quad);
    if path.is_file() {
        return Some(path);
    }
    let legacy = legacy::resolve_legacy(&layout.segment_dir(quad), quad);
    if let Some(found) = &legacy {
        debug!("Using legacy quad file {} for quad {quad}", found.display());
    }
    legacy
}

/// Streams the chunk records of a quad file into `sink`.
///
/// Returns the number of records read. Records already handed to `sink`
/// stay there if a later record fails to parse.
pub fn read_quad_file<C, F>(path: &Path, sink: F) -> CodecResult<usize>
where
    C: Chunk,
    F: FnMut(ChunkCoord, C),
{
    let file = File::open(path).map_err(|e| CodecError::io(path, e))?;
    let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));
    let parse = |source| CodecError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let mut stream = RecordStream {
        sink,
        count: 0,
        marker: PhantomData,
    };
    (&mut stream).deserialize(&mut de).map_err(parse)?;
    de.end().map_err(parse)?;
    Ok(stream.count)
}

/// Decodes one record into its coordinate and chunk.
///
/// `version` is read first since payload members are interpreted by
/// version, and the coordinate is parsed before any payload member.
pub fn decode_record<C: Chunk>(
    mut record: Map<String, Value>,
) -> Result<(ChunkCoord, C), RecordError> {
    let version = match record.remove("version") {
        None => UNVERSIONED,
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(RecordError::BadVersion(value))?,
    };

    let coord = match record.remove("coordinates") {
        None => return Err(RecordError::MissingCoordinates),
        Some(value) => parse_coordinates(&value).ok_or(RecordError::BadCoordinates(value))?,
    };

    if VersionStatus::of(version) == VersionStatus::Newer {
        warn!(
            "Chunk {coord} was written by format version {version}, newer than {MAP_FORMAT_VERSION}"
        );
    }

    let mut chunk = C::blank();
    chunk.record_version(version);
    for (name, value) in record {
        chunk
            .load_member(&name, value, version)
            .map_err(|source| RecordError::Payload { coord, source })?;
    }
    Ok((coord, chunk))
}

fn parse_coordinates(value: &Value) -> Option<ChunkCoord> {
    let items = value.as_array()?;
    if items.len() != 3 {
        return None;
    }
    let mut xyz = [0i32; 3];
    for (slot, item) in xyz.iter_mut().zip(items) {
        *slot = i32::try_from(item.as_i64()?).ok()?;
    }
    Some(ChunkCoord::from(xyz))
}

struct RecordStream<C, F> {
    sink: F,
    count: usize,
    marker: PhantomData<fn() -> C>,
}

impl<'de, C, F> DeserializeSeed<'de> for &mut RecordStream<C, F>
where
    C: Chunk,
    F: FnMut(ChunkCoord, C),
{
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, C, F> Visitor<'de> for &mut RecordStream<C, F>
where
    C: Chunk,
    F: FnMut(ChunkCoord, C),
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of chunk records")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(record) = seq.next_element::<Map<String, Value>>()? {
            let (coord, chunk) = decode_record::<C>(record).map_err(de::Error::custom)?;
            (self.sink)(coord, chunk);
            self.count += 1;
        }
        Ok(())
    }
}

/// Saves one quad.
///
/// Every resident chunk is written when at least one of them is non-uniform.
/// When all are uniform nothing is written; if one of them reverted and a
/// file still exists, the file is removed. With `evict` set, every resident
/// chunk of the quad is returned for eviction, but only once the quad is on
/// disk: an error returns no evictions.
pub fn save_quad<C: Chunk>(
    layout: &MapLayout,
    chunks: &ChunkMap<C>,
    quad: QuadCoord,
    evict: bool,
    pretty: bool,
) -> CodecResult<QuadSave> {
    let resident: Vec<(ChunkCoord, &C)> = quad
        .chunks()
        .into_iter()
        .filter_map(|coord| chunks.get(&coord).map(|chunk| (coord, chunk)))
        .collect();
    let evict = if evict {
        resident.iter().map(|(coord, _)| *coord).collect()
    } else {
        Vec::new()
    };

    if resident.iter().all(|(_, chunk)| chunk.is_uniform()) {
        let reverted = resident.iter().any(|(_, chunk)| chunk.is_reverted());
        let outcome = if reverted && remove_quad_files(layout, quad)? {
            debug!("Removed stale file for uniform quad {quad}");
            QuadOutcome::Tombstoned
        } else {
            QuadOutcome::Skipped
        };
        return Ok(QuadSave { outcome, evict });
    }

    write_quad_file(layout, quad, &resident, pretty)?;
    debug!("Wrote {} chunks of quad {quad}", resident.len());
    Ok(QuadSave {
        outcome: QuadOutcome::Written(resident.len()),
        evict,
    })
}

/// Removes the canonical and any legacy-named file of `quad`.
///
/// Returns true if a file was removed.
pub fn remove_quad_files(layout: &MapLayout, quad: QuadCoord) -> CodecResult<bool> {
    let mut paths = vec![layout.locate(quad)];
    paths.extend(legacy::resolve_legacy(&layout.segment_dir(quad), quad));

    let mut removed = false;
    for path in paths {
        match fs::remove_file(&path) {
            Ok(()) => removed = true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => return Err(CodecError::io(&path, e)),
        }
    }
    Ok(removed)
}

/// Writes `records` to the quad's file through a temporary sibling file.
fn write_quad_file<C: Chunk>(
    layout: &MapLayout,
    quad: QuadCoord,
    records: &[(ChunkCoord, &C)],
    pretty: bool,
) -> CodecResult<()> {
    let dir = layout.segment_dir(quad);
    fs::create_dir_all(&dir).map_err(|e| CodecError::io(&dir, e))?;

    let temp = layout.temp_path(quad);
    let path = layout.locate(quad);
    if let Err(e) = write_records(&temp, records, pretty) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    fs::rename(&temp, &path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        CodecError::io(&path, e)
    })
}

fn write_records<C: Chunk>(
    path: &Path,
    records: &[(ChunkCoord, &C)],
    pretty: bool,
) -> CodecResult<()> {
    let file = File::create(path).map_err(|e| CodecError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let seq = RecordSeq(records);
    let encoded = if pretty {
        serde_json::to_writer_pretty(&mut writer, &seq)
    } else {
        serde_json::to_writer(&mut writer, &seq)
    };
    encoded.map_err(|source| CodecError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|e| CodecError::io(path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| CodecError::io(path, e))
}

struct RecordSeq<'a, C>(&'a [(ChunkCoord, &'a C)]);

impl<C: Chunk> Serialize for RecordSeq<'_, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for (coord, chunk) in self.0 {
            seq.serialize_element(&ChunkRecord {
                coord: *coord,
                chunk: *chunk,
            })?;
        }
        seq.end()
    }
}

struct ChunkRecord<'a, C> {
    coord: ChunkCoord,
    chunk: &'a C,
}

impl<C: Chunk> Serialize for ChunkRecord<'_, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut payload = PayloadWriter::new();
        self.chunk
            .store(&mut payload)
            .map_err(|e| ser::Error::custom(format!("chunk {}: {e}", self.coord)))?;
        let members = payload.into_members();

        let mut map = serializer.serialize_map(Some(members.len() + 2))?;
        map.serialize_entry("version", &MAP_FORMAT_VERSION)?;
        map.serialize_entry("coordinates", &self.coord.to_array())?;
        for (name, value) in &members {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::RawChunk;
    use serde_json::json;
    use tempfile::TempDir;

    fn solid(tag: &str) -> RawChunk {
        RawChunk::new().with_member("terrain", json!([tag]))
    }

    fn read_all(path: &Path) -> Vec<(ChunkCoord, RawChunk)> {
        let mut out = Vec::new();
        read_quad_file::<RawChunk, _>(path, |coord, chunk| out.push((coord, chunk)))
            .expect("read failed");
        out
    }

    #[test]
    fn test_full_quad_round_trip() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = MapLayout::new(dir.path());
        let quad = QuadCoord::new(3, -4, 1);

        let mut chunks = ChunkMap::default();
        for (i, coord) in quad.chunks().into_iter().enumerate() {
            chunks.insert(coord, solid(&format!("t_rock_{i}")));
        }

        let saved = save_quad(&layout, &chunks, quad, false, false).expect("save failed");
        assert_eq!(saved.outcome, QuadOutcome::Written(4));
        assert!(saved.evict.is_empty());

        let loaded = read_all(&layout.locate(quad));
        let coords: Vec<_> = loaded.iter().map(|(c, _)| *c).collect();
        assert_eq!(coords, quad.chunks().to_vec());
        for (coord, chunk) in loaded {
            assert_eq!(Some(chunk.members()), chunks.get(&coord).map(RawChunk::members));
            assert_eq!(chunk.loaded_version(), Some(MAP_FORMAT_VERSION));
        }
        assert!(!layout.temp_path(quad).exists());
    }

    #[test]
    fn test_mixed_quad_writes_uniform_residents_too() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = MapLayout::new(dir.path());
        let quad = QuadCoord::new(0, 0, 0);
        let [a, b, ..] = quad.chunks();

        let mut chunks = ChunkMap::default();
        chunks.insert(a, solid("t_wall"));
        chunks.insert(b, RawChunk::new());

        let saved = save_quad(&layout, &chunks, quad, true, false).expect("save failed");
        assert_eq!(saved.outcome, QuadOutcome::Written(2));
        assert_eq!(saved.evict, vec![a, b]);
        assert_eq!(read_all(&layout.locate(quad)).len(), 2);
    }

    #[test]
    fn test_uniform_quad_is_not_written() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = MapLayout::new(dir.path());
        let quad = QuadCoord::new(5, 5, 0);

        let mut chunks = ChunkMap::default();
        for coord in quad.chunks() {
            chunks.insert(coord, RawChunk::new());
        }

        let saved = save_quad(&layout, &chunks, quad, true, false).expect("save failed");
        assert_eq!(saved.outcome, QuadOutcome::Skipped);
        assert_eq!(saved.evict.len(), 4);
        assert!(!layout.locate(quad).exists());
        assert!(!layout.segment_dir(quad).exists());
    }

    #[test]
    fn test_reverted_quad_removes_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = MapLayout::new(dir.path());
        let quad = QuadCoord::new(-1, 2, 0);

        let mut chunks = ChunkMap::default();
        for coord in quad.chunks() {
            chunks.insert(coord, solid("t_floor"));
        }
        save_quad(&layout, &chunks, quad, false, false).expect("save failed");
        assert!(layout.locate(quad).is_file());

        for chunk in chunks.values_mut() {
            chunk.revert_to_uniform();
        }
        let saved = save_quad(&layout, &chunks, quad, false, false).expect("save failed");
        assert_eq!(saved.outcome, QuadOutcome::Tombstoned);
        assert!(!layout.locate(quad).exists());

        let saved = save_quad(&layout, &chunks, quad, false, false).expect("save failed");
        assert_eq!(saved.outcome, QuadOutcome::Skipped);
    }

    #[test]
    fn test_reverted_quad_removes_legacy_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = MapLayout::new(dir.path());
        let quad = QuadCoord::new(1500, 0, 0);
        fs::create_dir_all(layout.segment_dir(quad)).expect("mkdir failed");
        let legacy = layout.segment_dir(quad).join("1,500.0.0.map");
        fs::write(&legacy, "[]").expect("write failed");

        let mut chunks = ChunkMap::default();
        let mut chunk = solid("t_sand");
        chunk.revert_to_uniform();
        chunks.insert(quad.origin(), chunk);

        let saved = save_quad(&layout, &chunks, quad, false, false).expect("save failed");
        assert_eq!(saved.outcome, QuadOutcome::Tombstoned);
        assert!(!legacy.exists());
    }

    #[test]
    fn test_failed_write_yields_no_evictions() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = MapLayout::new(dir.path());
        let quad = QuadCoord::new(0, 0, 0);
        fs::create_dir_all(layout.maps_dir()).expect("mkdir failed");
        fs::write(layout.segment_dir(quad), "not a directory").expect("write failed");

        let mut chunks = ChunkMap::default();
        chunks.insert(quad.origin(), solid("t_wall"));
        let err = save_quad(&layout, &chunks, quad, true, false).expect_err("save should fail");
        assert!(matches!(err, CodecError::Io { .. }));
    }

    #[test]
    fn test_members_read_in_any_order() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("0.0.0.map");
        fs::write(
            &path,
            r#"[{"furniture":[1],"coordinates":[0,1,0],"version":1},{"coordinates":[1,1,0]}]"#,
        )
        .expect("write failed");

        let loaded = read_all(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].0, ChunkCoord::new(0, 1, 0));
        assert_eq!(loaded[0].1.loaded_version(), Some(1));
        assert_eq!(loaded[0].1.member("furniture"), Some(&json!([1])));
        assert!(loaded[1].1.is_uniform());
        assert_eq!(loaded[1].1.loaded_version(), Some(UNVERSIONED));
    }

    #[test]
    fn test_corrupt_file_is_parse_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("0.0.0.map");
        fs::write(&path, r#"[{"coordinates":[0,0,0]},"#).expect("write failed");
        let result = read_quad_file::<RawChunk, _>(&path, |_, _| {});
        assert!(matches!(result, Err(CodecError::Parse { .. })));

        fs::write(&path, r#"[{"coordinates":[0,0]}]"#).expect("write failed");
        let result = read_quad_file::<RawChunk, _>(&path, |_, _| {});
        assert!(matches!(result, Err(CodecError::Parse { .. })));
    }

    #[test]
    fn test_decode_record_rejects_bad_version() {
        let record = json!({"version": -1, "coordinates": [0, 0, 0]});
        let Value::Object(record) = record else {
            unreachable!()
        };
        assert!(matches!(
            decode_record::<RawChunk>(record),
            Err(RecordError::BadVersion(_))
        ));
    }

    #[test]
    fn test_find_quad_file_prefers_canonical() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = MapLayout::new(dir.path());
        let quad = QuadCoord::new(-4096, 3, 0);
        assert!(find_quad_file(&layout, quad).is_none());

        fs::create_dir_all(layout.segment_dir(quad)).expect("mkdir failed");
        let legacy = layout.segment_dir(quad).join("-4,096.3.0.map");
        fs::write(&legacy, "[]").expect("write failed");
        assert_eq!(find_quad_file(&layout, quad), Some(legacy));

        fs::write(layout.locate(quad), "[]").expect("write failed");
        assert_eq!(find_quad_file(&layout, quad), Some(layout.locate(quad)));
    }
}
