//! Walks a world's `maps` directory and classifies what it finds.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use strata_common::QuadCoord;
use strata_world::layout::{parse_quad_file_name, MapLayout, TEMP_FILE_SUFFIX};
use strata_world::legacy::parse_legacy_file_name;

/// Files found under a `maps` directory.
#[derive(Debug, Default)]
pub struct MapSurvey {
    /// Quad files with canonical names
    pub quads: Vec<(QuadCoord, PathBuf)>,
    /// Quad files with locale-formatted names
    pub legacy: Vec<(QuadCoord, PathBuf)>,
    /// Temporary files left by interrupted saves
    pub leftovers: Vec<PathBuf>,
    /// Anything else
    pub unrecognized: Vec<PathBuf>,
}

impl MapSurvey {
    /// Every quad that has a file under either naming scheme.
    pub fn all_quads(&self) -> impl Iterator<Item = QuadCoord> + '_ {
        self.quads.iter().chain(&self.legacy).map(|(quad, _)| *quad)
    }
}

/// Surveys the `maps` directory of `layout`. A missing directory is empty.
pub fn survey(layout: &MapLayout) -> io::Result<MapSurvey> {
    let mut found = MapSurvey::default();
    let maps_dir = layout.maps_dir();
    if !maps_dir.is_dir() {
        return Ok(found);
    }

    for segment in fs::read_dir(&maps_dir)? {
        let segment = segment?.path();
        if !segment.is_dir() {
            found.unrecognized.push(segment);
            continue;
        }
        for entry in fs::read_dir(&segment)? {
            classify(&mut found, entry?.path());
        }
    }

    found.quads.sort();
    found.legacy.sort();
    Ok(found)
}

fn classify(found: &mut MapSurvey, path: PathBuf) {
    let Some(name) = file_name(&path) else {
        found.unrecognized.push(path);
        return;
    };
    if let Some(quad) = parse_quad_file_name(&name) {
        found.quads.push((quad, path));
    } else if let Some(quad) = parse_legacy_file_name(&name) {
        found.legacy.push((quad, path));
    } else if name.ends_with(TEMP_FILE_SUFFIX) {
        found.leftovers.push(path);
    } else {
        found.unrecognized.push(path);
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}
