//! Probability sky map input.
//!
//! A [`ProbabilityMap`] is a full-sky HEALPix map in nested order, one
//! probability value per pixel. Maps arrive either as plain text (one value
//! per line, the common exchange form for tutorial data) or in the crate's
//! binary format. Fetching the file from wherever it lives upstream is the
//! caller's concern; failures surface as plain `io::Error`s with no retry
//! here.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::Array1;

use crate::healpix;
use crate::region::{self, CredibleRegion, RegionError};

const MAGIC: &[u8; 4] = b"SMAP";
const VERSION: u32 = 1;

/// A pixelized probability distribution over the sphere.
#[derive(Debug, Clone)]
pub struct ProbabilityMap {
    /// Resolution order: the map has `12 * 4^depth` pixels.
    pub depth: u8,
    /// Probability per pixel, nested order.
    pub probs: Array1<f64>,
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

impl ProbabilityMap {
    /// Build a map from raw per-pixel values, deriving the resolution order
    /// from the length.
    pub fn from_values(values: Vec<f64>) -> Result<ProbabilityMap, RegionError> {
        let Some(depth) = healpix::depth_for_npix(values.len()) else {
            return Err(RegionError::MalformedMap {
                len: values.len(),
                detail: "length is not 12 * 4^k",
            });
        };
        if values.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(RegionError::MalformedMap {
                len: values.len(),
                detail: "values must be finite and non-negative",
            });
        }
        Ok(ProbabilityMap {
            depth,
            probs: Array1::from_vec(values),
        })
    }

    /// Total probability mass. Close to 1 for a normalized map; not enforced.
    pub fn total_mass(&self) -> f64 {
        self.probs.sum()
    }

    /// Extract the credible region enclosing `confidence` probability mass.
    pub fn credible_region(&self, confidence: f64) -> Result<CredibleRegion, RegionError> {
        region::credible_pixels(self.probs.as_slice().unwrap_or(&[]), confidence)
    }

    /// Read a map from text: one value per line, `#` comments and blank
    /// lines ignored.
    pub fn load_text(path: &Path) -> io::Result<ProbabilityMap> {
        let file = File::open(path)?;
        let r = BufReader::new(file);

        let mut values = Vec::new();
        for (lineno, line) in r.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let v: f64 = line
                .parse()
                .map_err(|_| invalid(format!("line {}: bad value '{line}'", lineno + 1)))?;
            values.push(v);
        }

        ProbabilityMap::from_values(values).map_err(|e| invalid(e.to_string()))
    }

    /// Write the map in the binary format.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        w.write_all(MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&[self.depth])?;
        for &p in &self.probs {
            w.write_all(&p.to_le_bytes())?;
        }
        w.flush()
    }

    /// Read a map from the binary format.
    pub fn load(path: &Path) -> io::Result<ProbabilityMap> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(invalid("invalid magic bytes"));
        }

        let mut vbuf = [0u8; 4];
        r.read_exact(&mut vbuf)?;
        let version = u32::from_le_bytes(vbuf);
        if version != VERSION {
            return Err(invalid(format!("unsupported version: {version}")));
        }

        let mut dbuf = [0u8; 1];
        r.read_exact(&mut dbuf)?;
        let depth = dbuf[0];
        if depth > healpix::MAX_DEPTH {
            return Err(invalid(format!("order {depth} too deep")));
        }

        let n = healpix::npix(depth) as usize;
        // Cap the pre-allocation so a corrupt depth fails on read_exact
        // instead of reserving the claimed size up front.
        let mut values = Vec::with_capacity(n.min(1 << 20));
        let mut fbuf = [0u8; 8];
        for _ in 0..n {
            r.read_exact(&mut fbuf)?;
            values.push(f64::from_le_bytes(fbuf));
        }

        ProbabilityMap::from_values(values).map_err(|e| invalid(e.to_string()))
    }

    /// Dispatch on extension: `.txt`/`.dat` are text, everything else binary.
    pub fn load_auto(path: &Path) -> io::Result<ProbabilityMap> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt" | "dat") => ProbabilityMap::load_text(path),
            _ => ProbabilityMap::load(path),
        }
    }
}
