//! `scan` and `compact` subcommands.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use strata_common::{QuadCoord, VersionStatus, MAP_FORMAT_VERSION};
use strata_world::codec::read_quad_file;
use strata_world::prelude::*;
use tracing::{info, warn};

use crate::survey::{survey, MapSurvey};

/// Totals gathered by [`scan`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Quad files found (canonical and legacy)
    pub files: usize,
    /// Files under a legacy name
    pub legacy_files: usize,
    /// Chunk records read
    pub records: usize,
    /// Records with no payload
    pub uniform_records: usize,
    /// Records written by an older format version
    pub outdated_records: usize,
    /// Files that failed to read
    pub unreadable: usize,
    /// Temporary files from interrupted saves
    pub leftovers: usize,
}

/// Reads every quad file without keeping anything resident.
pub fn scan(layout: &MapLayout) -> Result<ScanSummary> {
    let found = survey(layout)
        .with_context(|| format!("surveying {}", layout.maps_dir().display()))?;
    let mut summary = ScanSummary {
        files: found.quads.len() + found.legacy.len(),
        legacy_files: found.legacy.len(),
        leftovers: found.leftovers.len(),
        ..ScanSummary::default()
    };

    for (quad, path) in found.quads.iter().chain(&found.legacy) {
        let result = read_quad_file::<RawChunk, _>(path, |coord, chunk| {
            if !quad.contains(coord) {
                warn!("{} holds chunk {coord} outside quad {quad}", path.display());
            }
            summary.records += 1;
            if chunk.is_uniform() {
                summary.uniform_records += 1;
            }
            let status = chunk.loaded_version().map(VersionStatus::of);
            if status.is_some_and(VersionStatus::needs_migration) {
                summary.outdated_records += 1;
            }
        });
        if let Err(e) = result {
            warn!("{e}");
            summary.unreadable += 1;
        }
    }
    for path in &found.unrecognized {
        warn!("Unrecognized entry {}", path.display());
    }

    info!(
        "Scanned {} quad files ({} legacy, {} unreadable): {} chunks, {} uniform, {} outdated",
        summary.files,
        summary.legacy_files,
        summary.unreadable,
        summary.records,
        summary.uniform_records,
        summary.outdated_records
    );
    Ok(summary)
}

/// Rewrites every readable quad under its canonical name and drops files
/// that only hold uniform chunks.
pub fn compact(config: MapConfig) -> Result<SaveReport> {
    let layout = MapLayout::new(config.world_root.clone());
    let found = survey(&layout)
        .with_context(|| format!("surveying {}", layout.maps_dir().display()))?;
    remove_leftovers(&found);

    // Terrain is unknown here, so nothing may be synthesized.
    let terrain = FlatTerrain(TerrainClass::varied("unknown"));
    let mut cache: ChunkCache<RawChunk> = ChunkCache::new(config, terrain);
    let mut skipped = Vec::new();
    for quad in found.all_quads() {
        match cache.preload_quad(quad) {
            Err(e) => {
                warn!("Skipping quad {quad}: {e}");
                skipped.push(quad);
            },
            Ok(_) if holds_other_version(&cache, quad) => {
                warn!("Skipping quad {quad}: not written by format version {MAP_FORMAT_VERSION}");
                skipped.push(quad);
            },
            Ok(_) => {},
        }
    }

    // Raw chunks cannot migrate payloads, and a bad file must never be
    // replaced by the part of it that did load.
    for quad in &skipped {
        for coord in quad.chunks() {
            if cache.contains(coord) {
                let _ = cache.remove(coord);
            }
        }
    }

    let coords: Vec<_> = cache.coords().collect();
    for coord in coords {
        if let Some(chunk) = cache.get_mut(coord) {
            chunk.force_tombstone();
        }
    }

    let report = cache.save_all(true, &Everything, &mut LogProgress);
    for (quad, path) in &found.legacy {
        if path.exists() && !report.failed.contains(quad) && !skipped.contains(quad) {
            remove_file(path);
        }
    }
    Ok(report)
}

fn holds_other_version(cache: &ChunkCache<RawChunk>, quad: QuadCoord) -> bool {
    quad.chunks()
        .into_iter()
        .filter_map(|coord| cache.get(coord))
        .any(|chunk| chunk.loaded_version().is_some_and(|v| v != MAP_FORMAT_VERSION))
}

fn remove_leftovers(found: &MapSurvey) {
    for path in &found.leftovers {
        remove_file(path);
    }
}

fn remove_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!("Removed {}", path.display()),
        Err(e) => warn!("Failed to remove {}: {e}", path.display()),
    }
}
