//! Catalog positions and coverage filtering.
//!
//! The query side of a coverage map: given catalog rows with sky positions,
//! keep the ones that fall inside a [`Moc`]. Rows are read from plain text,
//! `lon_deg lat_deg [label...]` per line.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::moc::Moc;

/// A catalog row: a sky position plus whatever label the source file had.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSource {
    /// Longitude (right ascension) in radians, [0, 2π).
    pub lon: f64,
    /// Latitude (declination) in radians, [-π/2, π/2].
    pub lat: f64,
    /// Remainder of the source line, trimmed. Empty if the line had none.
    pub label: String,
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Split off the leading whitespace-delimited token, returning it and the
/// rest of the line with leading whitespace stripped.
fn split_token(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Read catalog rows from text. Each line is `lon_deg lat_deg [label...]`;
/// blank lines and `#` comments are ignored.
pub fn load_sources(path: &Path) -> io::Result<Vec<CatalogSource>> {
    let file = File::open(path)?;
    let r = BufReader::new(file);

    let mut sources = Vec::new();
    for (lineno, line) in r.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Columns may be aligned with runs of spaces or tabs, so take the
        // first two whitespace-delimited tokens and keep the rest verbatim.
        let (lon_str, rest) = split_token(line);
        let (lat_str, label) = split_token(rest);
        if lat_str.is_empty() {
            return Err(invalid(format!("line {}: missing latitude", lineno + 1)));
        }

        let lon_deg: f64 = lon_str
            .parse()
            .map_err(|_| invalid(format!("line {}: bad longitude '{lon_str}'", lineno + 1)))?;
        let lat_deg: f64 = lat_str
            .parse()
            .map_err(|_| invalid(format!("line {}: bad latitude '{lat_str}'", lineno + 1)))?;
        if !(-90.0..=90.0).contains(&lat_deg) {
            return Err(invalid(format!(
                "line {}: latitude {lat_deg} outside [-90, 90]",
                lineno + 1
            )));
        }

        sources.push(CatalogSource {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
            label: label.to_string(),
        });
    }
    Ok(sources)
}

/// Return the sources whose positions fall inside the coverage, preserving
/// input order.
pub fn filter_sources<'a>(moc: &Moc, sources: &'a [CatalogSource]) -> Vec<&'a CatalogSource> {
    sources
        .iter()
        .filter(|s| moc.contains(s.lon, s.lat))
        .collect()
}
