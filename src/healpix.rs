//! HEALPix (Hierarchical Equal Area isoLatitude Pixelisation) tessellation.
//!
//! Implements the nested indexing scheme: 12 base cells, each recursively
//! split into 4 children, with the within-base position bit-interleaved so
//! that the 4 children of any cell are contiguous in index space.
//!
//! The 12 base cells are laid out as:
//! - 0–3: north polar cap
//! - 4–7: equatorial belt
//! - 8–11: south polar cap
//!
//! Within each base cell, `x` increases northeast and `y` increases northwest.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

/// Deepest supported resolution order. Nested indices fit in a u64 up to here.
pub const MAX_DEPTH: u8 = 29;

/// Nside for a given depth: 2^depth.
pub fn nside(depth: u8) -> u64 {
    1u64 << depth
}

/// Total number of pixels at a given depth: 12 * nside^2.
pub fn npix(depth: u8) -> u64 {
    12 * nside(depth) * nside(depth)
}

/// Solid angle (steradians) of a single pixel at the given depth.
pub fn pixel_area(depth: u8) -> f64 {
    4.0 * PI / npix(depth) as f64
}

/// Derive the resolution order from a full-sky map length.
///
/// Returns `Some(k)` if `n == 12 * 4^k` for some `k <= MAX_DEPTH`, else `None`.
pub fn depth_for_npix(n: usize) -> Option<u8> {
    for depth in 0..=MAX_DEPTH {
        let np = npix(depth);
        if np as usize == n {
            return Some(depth);
        }
        if np as usize > n {
            break;
        }
    }
    None
}

/// Parent of a nested index at the next coarser depth.
///
/// A nested index is `base * 4^depth + interleave(x, y)`, so dropping the two
/// low bits moves one level up the cell tree.
pub fn parent(hash: u64) -> u64 {
    hash >> 2
}

/// The 4 children of a nested index at the next finer depth.
pub fn children(hash: u64) -> [u64; 4] {
    let first = hash << 2;
    [first, first + 1, first + 2, first + 3]
}

/// Pack (depth, nested index) into a single NUNIQ integer: `4^(depth+1) + hash`.
///
/// The offset keeps indices from different depths disjoint, so a flat set of
/// NUNIQ values can describe a multi-order coverage without ambiguity.
pub fn uniq(depth: u8, hash: u64) -> u64 {
    (1u64 << (2 * depth + 2)) + hash
}

/// Invert [`uniq`]: recover (depth, nested index) from a NUNIQ integer.
///
/// Returns `None` for values that no (depth, index) pair maps to.
pub fn from_uniq(u: u64) -> Option<(u8, u64)> {
    if u < 4 {
        return None;
    }
    // Depth is fixed by the leading bit: the NUNIQ ranges [4^(d+1), 4^(d+2))
    // for consecutive d tile the integers >= 4.
    let depth = (63 - u.leading_zeros() as u8) / 2 - 1;
    if depth > MAX_DEPTH {
        return None;
    }
    // The range [4^(depth+1), 4^(depth+2)) has width npix(depth) exactly, so
    // the remainder is always a valid index at this depth.
    Some((depth, u - (1u64 << (2 * depth + 2))))
}

/// Convert (lon, lat) in radians to a nested pixel index.
///
/// `lon` is longitude (right ascension) in [0, 2π), `lat` is latitude
/// (declination) in [-π/2, π/2].
pub fn lon_lat_to_nested(lon: f64, lat: f64, depth: u8) -> u64 {
    let (base, x, y) = lon_lat_to_base_xy(lon, lat, nside(depth) as f64);
    compose_nested(base, x, y, depth)
}

/// Convert a nested pixel index to the (lon, lat) of its center, in radians.
pub fn nested_to_center(hash: u64, depth: u8) -> (f64, f64) {
    let (base, x, y) = decompose_nested(hash, depth);
    base_xy_to_lon_lat(base, x as f64 + 0.5, y as f64 + 0.5, nside(depth) as f64)
}

// ---------------------------------------------------------------------------
// Internal: base cell classification
// ---------------------------------------------------------------------------

fn is_north(base: u64) -> bool {
    base <= 3
}

fn is_south(base: u64) -> bool {
    base >= 8
}

// ---------------------------------------------------------------------------
// Internal: coordinate ↔ (base, x, y)
// ---------------------------------------------------------------------------

/// Convert (lon, lat) to (base cell, x, y) in the XY scheme with continuous coords.
fn lon_lat_to_base_xy(lon: f64, lat: f64, ns: f64) -> (u64, u64, u64) {
    let z = lat.sin();
    let mut phi = lon;
    if phi < 0.0 {
        phi += TAU;
    }
    if phi >= TAU {
        phi -= TAU;
    }

    let phi_t = phi % FRAC_PI_2;

    // Determine quadrant column
    let column = ((phi / FRAC_PI_2).floor() as i64).rem_euclid(4) as u64;

    if z.abs() >= 2.0 / 3.0 {
        // Polar cap
        let north = z >= 0.0;
        let zfactor = if north { 1.0 } else { -1.0 };

        // Solve eqns 19/20 from the HEALPix paper for kx = Ns - xx, ky = Ns - yy
        let root_x = (1.0 - z * zfactor) * 3.0 * (ns * (2.0 * phi_t - PI) / PI).powi(2);
        let kx = if root_x <= 0.0 { 0.0 } else { root_x.sqrt() };

        let root_y = (1.0 - z * zfactor) * 3.0 * (ns * 2.0 * phi_t / PI).powi(2);
        let ky = if root_y <= 0.0 { 0.0 } else { root_y.sqrt() };

        let (xx, yy) = if north { (ns - kx, ns - ky) } else { (ky, kx) };

        let x = (xx.floor() as u64).min(ns as u64 - 1);
        let y = (yy.floor() as u64).min(ns as u64 - 1);

        let base = if north { column } else { 8 + column };
        (base, x, y)
    } else {
        // Equatorial region
        let zunits = (z + 2.0 / 3.0) / (4.0 / 3.0);
        let phiunits = phi_t / FRAC_PI_2;

        let u1 = zunits + phiunits;
        let u2 = zunits - phiunits + 1.0;

        let mut xx = u1 * ns;
        let mut yy = u2 * ns;

        let base = if xx >= ns {
            xx -= ns;
            if yy >= ns {
                yy -= ns;
                column // north polar
            } else {
                ((column + 1) % 4) + 4 // right equatorial
            }
        } else if yy >= ns {
            yy -= ns;
            column + 4 // left equatorial
        } else {
            8 + column // south polar
        };

        let x = (xx.floor() as u64).min(ns as u64 - 1);
        let y = (yy.floor() as u64).min(ns as u64 - 1);

        (base, x, y)
    }
}

/// Convert (base cell, x, y) continuous coords back to (lon, lat).
fn base_xy_to_lon_lat(base: u64, x: f64, y: f64, ns: f64) -> (f64, f64) {
    let x_norm = x / ns;
    let y_norm = y / ns;

    // Check if this pixel is in the polar or equatorial regime
    let is_polar_region = if is_north(base) {
        (x_norm + y_norm) > 1.0
    } else if is_south(base) {
        (x_norm + y_norm) < 1.0
    } else {
        false
    };

    if !is_polar_region {
        // Equatorial computation
        let (phi_off, z_off, chp) = if base <= 3 {
            (1.0, 0.0, base)
        } else if base <= 7 {
            (0.0, -1.0, base - 4)
        } else {
            (1.0, -2.0, base - 8)
        };

        let z = (2.0 / 3.0) * (x_norm + y_norm + z_off);
        let phi = FRAC_PI_4 * (x_norm - y_norm + phi_off + 2.0 * chp as f64);

        let lat = z.clamp(-1.0, 1.0).asin();
        let mut lon = phi;
        if lon < 0.0 {
            lon += TAU;
        }
        if lon >= TAU {
            lon -= TAU;
        }
        (lon, lat)
    } else {
        // Polar computation — inverse of eqns 19/20 from HEALPix paper
        let north = is_north(base);
        let zfactor = if north { 1.0 } else { -1.0 };

        // For south polar, swap and flip to work in north-polar convention
        let (px, py) = if north { (x, y) } else { (ns - y, ns - x) };

        let kx = ns - px;
        let ky = ns - py;

        // phi_t = pi * (Ns - y) / (2 * ((Ns - x) + (Ns - y)))
        let phi_t = if kx + ky == 0.0 {
            0.0
        } else {
            PI * ky / (2.0 * (kx + ky))
        };

        // Recover z, using two branches to avoid division-by-zero
        let z = if phi_t < FRAC_PI_4 {
            let denom = (2.0 * phi_t - PI) * ns;
            if denom.abs() < 1e-15 {
                zfactor
            } else {
                let val = PI * kx / denom;
                (1.0 - val * val / 3.0) * zfactor
            }
        } else {
            let denom = 2.0 * phi_t * ns;
            if denom.abs() < 1e-15 {
                zfactor
            } else {
                let val = PI * ky / denom;
                (1.0 - val * val / 3.0) * zfactor
            }
        };

        let base_col = if is_south(base) { base - 8 } else { base };
        let phi = FRAC_PI_2 * base_col as f64 + phi_t;

        let lat = z.clamp(-1.0, 1.0).asin();
        let mut lon = phi;
        if lon < 0.0 {
            lon += TAU;
        }
        if lon >= TAU {
            lon -= TAU;
        }
        (lon, lat)
    }
}

// ---------------------------------------------------------------------------
// Internal: XY ↔ nested bit-interleaving
// ---------------------------------------------------------------------------

/// Compose a nested index from (base, x, y).
fn compose_nested(base: u64, x: u64, y: u64, depth: u8) -> u64 {
    let ns2 = nside(depth) * nside(depth);
    let sub = xy_to_nested_sub(x, y);
    base * ns2 + sub
}

/// Decompose a nested index into (base, x, y).
fn decompose_nested(hash: u64, depth: u8) -> (u64, u64, u64) {
    let ns2 = nside(depth) * nside(depth);
    let base = hash / ns2;
    let sub = hash % ns2;
    let (x, y) = nested_sub_to_xy(sub);
    (base, x, y)
}

/// Bit-interleave (x, y) → sub-index. x provides even bits, y provides odd bits.
fn xy_to_nested_sub(x: u64, y: u64) -> u64 {
    let mut result = 0u64;
    let mut xx = x;
    let mut yy = y;
    let mut bit = 0;
    while xx > 0 || yy > 0 {
        result |= (xx & 1) << bit;
        bit += 1;
        result |= (yy & 1) << bit;
        bit += 1;
        xx >>= 1;
        yy >>= 1;
    }
    result
}

/// De-interleave sub-index → (x, y).
fn nested_sub_to_xy(sub: u64) -> (u64, u64) {
    let mut x = 0u64;
    let mut y = 0u64;
    let mut s = sub;
    let mut bit = 0;
    while s > 0 {
        x |= (s & 1) << bit;
        s >>= 1;
        y |= (s & 1) << bit;
        s >>= 1;
        bit += 1;
    }
    (x, y)
}
