//! Quad file names written by old builds.
//!
//! Old builds formatted quad file names with the process locale, which could
//! insert digit grouping separators: `1,234.7.8.map` instead of
//! `1234.7.8.map`. Those names are only ever read; new files always use the
//! canonical name.

use std::path::{Path, PathBuf};

use strata_common::QuadCoord;

use crate::layout::QUAD_FILE_SUFFIX;

/// Digit grouping separators used by common locales.
pub const GROUPING_SEPARATORS: [char; 6] = [',', '.', ' ', '\u{a0}', '\u{202f}', '\''];

/// Formats `value` with a thousands separator.
#[must_use]
pub fn group_digits(value: i32, separator: char) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(digit);
    }
    out
}

/// Returns the locale-formatted file names `quad` may have been saved under.
///
/// Empty when every coordinate is below one thousand in magnitude, since the
/// legacy name is then identical to the canonical one.
#[must_use]
pub fn legacy_file_names(quad: QuadCoord) -> Vec<String> {
    let grouped = [quad.x, quad.y, quad.z].iter().any(|v| v.unsigned_abs() >= 1000);
    if !grouped {
        return Vec::new();
    }
    GROUPING_SEPARATORS
        .iter()
        .map(|&sep| {
            format!(
                "{}.{}.{}{QUAD_FILE_SUFFIX}",
                group_digits(quad.x, sep),
                group_digits(quad.y, sep),
                group_digits(quad.z, sep)
            )
        })
        .collect()
}

/// Finds an existing legacy-named file for `quad` inside `segment_dir`.
#[must_use]
pub fn resolve_legacy(segment_dir: &Path, quad: QuadCoord) -> Option<PathBuf> {
    legacy_file_names(quad)
        .into_iter()
        .map(|name| segment_dir.join(name))
        .find(|path| path.is_file())
}

/// Parses a legacy file name whose separator is not `.`.
///
/// Names grouped with `.` are ambiguous and are not recognized.
#[must_use]
pub fn parse_legacy_file_name(name: &str) -> Option<QuadCoord> {
    let stem = name.strip_suffix(QUAD_FILE_SUFFIX)?;
    let cleaned: String = stem
        .chars()
        .filter(|c| *c == '.' || !GROUPING_SEPARATORS.contains(c))
        .collect();
    if cleaned.len() == stem.len() {
        return None;
    }
    crate::layout::parse_quad_file_name(&format!("{cleaned}{QUAD_FILE_SUFFIX}"))
}
