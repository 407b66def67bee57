//! Multi-Order Coverage (MOC) sky regions.
//!
//! A [`Moc`] represents a sky area as a set of HEALPix cells spanning
//! multiple resolution orders: wherever all 4 children of a cell are inside
//! the region, the region stores the parent instead. The merged form covers
//! exactly the same solid angle as the flat pixel set it was built from,
//! holds no overlapping cells, and is the unique coarsest representation
//! under that merge rule.

pub mod store;

use std::collections::BTreeMap;

use crate::healpix;

/// A multi-order coverage: per-order sorted sets of nested cell indices.
#[derive(Clone, PartialEq, Eq)]
pub struct Moc {
    /// Non-empty, ascending-sorted cell lists keyed by resolution order.
    levels: BTreeMap<u8, Vec<u64>>,
}

impl Moc {
    /// An empty coverage.
    pub fn new() -> Moc {
        Moc {
            levels: BTreeMap::new(),
        }
    }

    /// Build a coverage from pixels at a single depth, merging sibling
    /// groups to their coarsest form. Duplicate pixels are ignored.
    ///
    /// Returns `None` if `depth` exceeds [`healpix::MAX_DEPTH`] or any pixel
    /// is out of range for it; an out-of-range pixel would collide with a
    /// deeper order once packed to NUNIQ.
    pub fn from_pixels(depth: u8, pixels: &[u64]) -> Option<Moc> {
        let mut levels = BTreeMap::new();
        if !pixels.is_empty() {
            levels.insert(depth, pixels.to_vec());
        }
        Moc::from_levels(levels)
    }

    /// Reconstruct a coverage from packed NUNIQ cell values.
    ///
    /// Returns `None` if any value is not a valid NUNIQ integer or if two
    /// cells overlap (one an ancestor of another). The result is normalized,
    /// so complete sibling groups in the input collapse on load.
    pub fn from_uniq_cells(cells: &[u64]) -> Option<Moc> {
        let mut levels: BTreeMap<u8, Vec<u64>> = BTreeMap::new();
        for &u in cells {
            let (depth, hash) = healpix::from_uniq(u)?;
            levels.entry(depth).or_default().push(hash);
        }
        Moc::from_levels(levels)
    }

    /// Validate per-order cell lists and assemble a normalized coverage.
    fn from_levels(mut levels: BTreeMap<u8, Vec<u64>>) -> Option<Moc> {
        for (&depth, v) in &mut levels {
            if depth > healpix::MAX_DEPTH {
                return None;
            }
            v.sort_unstable();
            v.dedup();
            if v.last().is_some_and(|&last| last >= healpix::npix(depth)) {
                return None;
            }
        }
        levels.retain(|_, v| !v.is_empty());

        // Reject overlap: no cell may have an ancestor in a coarser level.
        let depths: Vec<u8> = levels.keys().copied().collect();
        for (i, &depth) in depths.iter().enumerate() {
            for &coarse in &depths[..i] {
                let shift = 2 * (depth - coarse) as u32;
                let coarse_cells = &levels[&coarse];
                for &hash in &levels[&depth] {
                    if coarse_cells.binary_search(&(hash >> shift)).is_ok() {
                        return None;
                    }
                }
            }
        }

        Some(Moc {
            levels: normalize(levels),
        })
    }

    /// Number of cells across all orders.
    pub fn n_cells(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Deepest order present, if any.
    pub fn max_depth(&self) -> Option<u8> {
        self.levels.keys().next_back().copied()
    }

    /// Cells as (order, nested index), ascending in order then index.
    pub fn cells(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
        self.levels
            .iter()
            .flat_map(|(&d, v)| v.iter().map(move |&h| (d, h)))
    }

    /// Cell count at each order present.
    pub fn order_counts(&self) -> Vec<(u8, usize)> {
        self.levels.iter().map(|(&d, v)| (d, v.len())).collect()
    }

    /// Total solid angle of the coverage, in steradians.
    pub fn solid_angle(&self) -> f64 {
        self.levels
            .iter()
            .map(|(&d, v)| healpix::pixel_area(d) * v.len() as f64)
            .sum()
    }

    /// Fraction of the full sky covered, in [0, 1].
    pub fn sky_fraction(&self) -> f64 {
        self.solid_angle() / (4.0 * std::f64::consts::PI)
    }

    /// Whether a sky position (radians) falls inside the coverage.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.levels.iter().any(|(&d, v)| {
            let hash = healpix::lon_lat_to_nested(lon, lat, d);
            v.binary_search(&hash).is_ok()
        })
    }

    /// Packed NUNIQ form, ascending. Ascending NUNIQ order coincides with
    /// (order, index) order because per-order NUNIQ ranges are disjoint and
    /// increasing.
    pub fn to_uniq(&self) -> Vec<u64> {
        self.cells().map(|(d, h)| healpix::uniq(d, h)).collect()
    }
}

impl Default for Moc {
    fn default() -> Moc {
        Moc::new()
    }
}

impl std::fmt::Debug for Moc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Moc")
            .field("n_cells", &self.n_cells())
            .field("max_depth", &self.max_depth())
            .field("sky_fraction", &self.sky_fraction())
            .finish()
    }
}

/// Merge closure: collapse every complete 4-sibling group into its parent,
/// cascading to coarser orders until no group remains.
///
/// Input lists must be sorted and deduplicated. Because siblings share all
/// but the two low index bits, a complete group appears as 4 consecutive
/// entries starting at an index with low bits 00, so one pass per level over
/// the sorted list finds every group.
fn normalize(mut levels: BTreeMap<u8, Vec<u64>>) -> BTreeMap<u8, Vec<u64>> {
    let Some(&max_depth) = levels.keys().next_back() else {
        return levels;
    };

    for depth in (1..=max_depth).rev() {
        let Some(cells) = levels.remove(&depth) else {
            continue;
        };

        let mut kept = Vec::new();
        let mut parents = Vec::new();
        let mut i = 0;
        while i < cells.len() {
            let c = cells[i];
            if c & 3 == 0
                && i + 3 < cells.len()
                && cells[i + 1] == c + 1
                && cells[i + 2] == c + 2
                && cells[i + 3] == c + 3
            {
                parents.push(c >> 2);
                i += 4;
            } else {
                kept.push(c);
                i += 1;
            }
        }

        if !kept.is_empty() {
            levels.insert(depth, kept);
        }
        if !parents.is_empty() {
            // Promoted parents join the next coarser level and take part in
            // its own merge pass on the following iteration.
            let up = levels.entry(depth - 1).or_default();
            up.extend(parents);
            up.sort_unstable();
        }
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healpix::{nested_to_center, npix, pixel_area, uniq};

    #[test]
    fn empty_moc() {
        let moc = Moc::new();
        assert!(moc.is_empty());
        assert_eq!(moc.n_cells(), 0);
        assert_eq!(moc.max_depth(), None);
        assert_eq!(moc.solid_angle(), 0.0);
        assert!(!moc.contains(0.0, 0.0));
    }

    #[test]
    fn single_pixel_stays_put() {
        let moc = Moc::from_pixels(2, &[17]).unwrap();
        assert_eq!(moc.cells().collect::<Vec<_>>(), vec![(2, 17)]);
    }

    #[test]
    fn complete_sibling_group_merges() {
        let moc = Moc::from_pixels(2, &[4, 5, 6, 7]).unwrap();
        assert_eq!(moc.cells().collect::<Vec<_>>(), vec![(1, 1)]);
    }

    #[test]
    fn incomplete_group_does_not_merge() {
        let moc = Moc::from_pixels(2, &[4, 5, 6]).unwrap();
        assert_eq!(
            moc.cells().collect::<Vec<_>>(),
            vec![(2, 4), (2, 5), (2, 6)]
        );
    }

    #[test]
    fn misaligned_run_does_not_merge() {
        // 4 consecutive pixels spanning two parents: no merge.
        let moc = Moc::from_pixels(2, &[2, 3, 4, 5]).unwrap();
        assert_eq!(moc.n_cells(), 4);
        assert_eq!(moc.max_depth(), Some(2));
    }

    #[test]
    fn merge_cascades_to_root() {
        // All 16 depth-2 descendants of base cell 3 collapse to (0, 3).
        let pixels: Vec<u64> = (48..64).collect();
        let moc = Moc::from_pixels(2, &pixels).unwrap();
        assert_eq!(moc.cells().collect::<Vec<_>>(), vec![(0, 3)]);
    }

    #[test]
    fn full_sphere_collapses_to_base_cells() {
        let pixels: Vec<u64> = (0..npix(3)).collect();
        let moc = Moc::from_pixels(3, &pixels).unwrap();
        assert_eq!(moc.n_cells(), 12);
        assert_eq!(moc.max_depth(), Some(0));
        assert!((moc.sky_fraction() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn merge_preserves_area() {
        // Mixed selection: one full parent group plus strays.
        let pixels = [0, 1, 2, 3, 9, 10, 40, 41, 42, 43, 44];
        let moc = Moc::from_pixels(2, &pixels).unwrap();
        let flat_area = pixel_area(2) * pixels.len() as f64;
        assert!((moc.solid_angle() - flat_area).abs() < 1e-15);
        assert!(moc.n_cells() < pixels.len());
    }

    #[test]
    fn merge_is_idempotent() {
        let pixels: Vec<u64> = (0..24).collect();
        let moc = Moc::from_pixels(1, &pixels).unwrap();
        let cells: Vec<u64> = moc.to_uniq();
        let again = Moc::from_uniq_cells(&cells).unwrap();
        assert_eq!(moc, again);
    }

    #[test]
    fn from_pixels_rejects_out_of_range() {
        // An order-0 index past the last base cell packs to the same NUNIQ
        // value as an order-1 cell, so it must be refused up front rather
        // than come back as a different region after a store round-trip.
        assert!(Moc::from_pixels(0, &[20]).is_none());
        assert!(Moc::from_pixels(2, &[npix(2)]).is_none());
        assert!(Moc::from_pixels(40, &[0]).is_none());
    }

    #[test]
    fn from_pixels_accepts_last_pixel() {
        let moc = Moc::from_pixels(2, &[npix(2) - 1]).unwrap();
        assert_eq!(moc.n_cells(), 1);
    }

    #[test]
    fn duplicates_ignored() {
        let moc = Moc::from_pixels(1, &[5, 5, 5, 6]).unwrap();
        assert_eq!(moc.n_cells(), 2);
    }

    #[test]
    fn lower_half_of_order1_merges_to_six_base_cells() {
        let pixels: Vec<u64> = (0..24).collect();
        let moc = Moc::from_pixels(1, &pixels).unwrap();
        assert_eq!(
            moc.cells().collect::<Vec<_>>(),
            (0..6).map(|b| (0, b)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn contains_cell_centers() {
        let pixels = [0, 1, 2, 3, 9];
        let moc = Moc::from_pixels(2, &pixels).unwrap();
        for &p in &pixels {
            let (lon, lat) = nested_to_center(p, 2);
            assert!(moc.contains(lon, lat), "pixel {p}");
        }
        // A pixel well outside the selection
        let (lon, lat) = nested_to_center(100, 2);
        assert!(!moc.contains(lon, lat));
    }

    #[test]
    fn uniq_roundtrip() {
        let pixels = [0, 1, 2, 3, 9, 10, 40];
        let moc = Moc::from_pixels(2, &pixels).unwrap();
        let packed = moc.to_uniq();
        assert!(packed.windows(2).all(|w| w[0] < w[1]), "not ascending");
        let back = Moc::from_uniq_cells(&packed).unwrap();
        assert_eq!(moc, back);
    }

    #[test]
    fn from_uniq_rejects_garbage() {
        assert!(Moc::from_uniq_cells(&[0]).is_none());
        assert!(Moc::from_uniq_cells(&[1]).is_none());
    }

    #[test]
    fn from_uniq_rejects_overlap() {
        // (0, 1) contains (1, 4): ancestor and descendant together.
        let cells = [uniq(0, 1), uniq(1, 4)];
        assert!(Moc::from_uniq_cells(&cells).is_none());
    }

    #[test]
    fn order_counts_summary() {
        let pixels: Vec<u64> = (0..24).chain([30]).collect();
        let moc = Moc::from_pixels(1, &pixels).unwrap();
        assert_eq!(moc.order_counts(), vec![(0, 6), (1, 1)]);
    }
}
