//! On-disk formats for coverage maps.
//!
//! Binary: magic, version, cell count, then the packed NUNIQ values as
//! little-endian u64. ASCII: one line per order, `order/idx idx idx ...`,
//! readable by eye and by external tools.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::Moc;

const MAGIC: &[u8; 4] = b"SMOC";
const VERSION: u32 = 1;

fn write_u32(w: &mut impl Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64(w: &mut impl Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

impl Moc {
    /// Write the coverage in the binary NUNIQ format.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        let packed = self.to_uniq();
        w.write_all(MAGIC)?;
        write_u32(&mut w, VERSION)?;
        write_u64(&mut w, packed.len() as u64)?;
        for u in packed {
            write_u64(&mut w, u)?;
        }
        w.flush()
    }

    /// Read a coverage from the binary NUNIQ format.
    pub fn load(path: &Path) -> io::Result<Moc> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(invalid("invalid magic bytes"));
        }

        let version = read_u32(&mut r)?;
        if version != VERSION {
            return Err(invalid(format!("unsupported version: {version}")));
        }

        let n_cells = read_u64(&mut r)? as usize;
        // Cap the pre-allocation so a corrupt count fails on read_exact
        // instead of reserving the claimed size up front.
        let mut cells = Vec::with_capacity(n_cells.min(1 << 20));
        for _ in 0..n_cells {
            cells.push(read_u64(&mut r)?);
        }

        Moc::from_uniq_cells(&cells).ok_or_else(|| invalid("invalid or overlapping cells"))
    }

    /// Write the coverage as text, one `order/idx idx ...` line per order.
    pub fn save_ascii(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        let mut current: Option<u8> = None;
        for (depth, hash) in self.cells() {
            if current != Some(depth) {
                if current.is_some() {
                    writeln!(w)?;
                }
                write!(w, "{depth}/{hash}")?;
                current = Some(depth);
            } else {
                write!(w, " {hash}")?;
            }
        }
        if current.is_some() {
            writeln!(w)?;
        }
        w.flush()
    }

    /// Read a coverage from the text format. Blank lines and `#` comments
    /// are ignored.
    pub fn load_ascii(path: &Path) -> io::Result<Moc> {
        let file = File::open(path)?;
        let r = BufReader::new(file);

        let mut levels: BTreeMap<u8, Vec<u64>> = BTreeMap::new();
        for (lineno, line) in r.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (depth_str, rest) = line
                .split_once('/')
                .ok_or_else(|| invalid(format!("line {}: missing '/'", lineno + 1)))?;
            let depth: u8 = depth_str
                .trim()
                .parse()
                .map_err(|_| invalid(format!("line {}: bad order '{depth_str}'", lineno + 1)))?;
            if depth > crate::healpix::MAX_DEPTH {
                return Err(invalid(format!("line {}: order {depth} too deep", lineno + 1)));
            }

            let entry = levels.entry(depth).or_default();
            for tok in rest.split_whitespace() {
                let hash: u64 = tok
                    .parse()
                    .map_err(|_| invalid(format!("line {}: bad index '{tok}'", lineno + 1)))?;
                entry.push(hash);
            }
        }

        Moc::from_levels(levels).ok_or_else(|| invalid("invalid or overlapping cells"))
    }
}
