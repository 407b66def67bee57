//! Confidence-region extraction from a pixelized probability sky map.
//!
//! Given one probability value per HEALPix pixel, find the smallest-area set
//! of pixels whose summed probability reaches a target confidence level. This
//! is the credible region of a localization map: sort pixels by descending
//! probability, accumulate, and cut at the target mass.

use crate::healpix;

/// Absolute slack applied when comparing the cumulative sum against the
/// target confidence, so a prefix short of the target only by accumulated
/// rounding still qualifies.
const CONFIDENCE_TOL: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub enum RegionError {
    /// Map length is not 12 * 4^k, or a value is negative or non-finite.
    MalformedMap { len: usize, detail: &'static str },
    /// Confidence level outside (0, 1].
    InvalidConfidence(f64),
}

impl std::fmt::Display for RegionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionError::MalformedMap { len, detail } => {
                write!(f, "malformed probability map of length {len}: {detail}")
            }
            RegionError::InvalidConfidence(c) => {
                write!(f, "confidence {c} outside (0, 1]")
            }
        }
    }
}

impl std::error::Error for RegionError {}

/// A credible region: the selected pixels at the map's native depth.
#[derive(Debug, Clone)]
pub struct CredibleRegion {
    /// Resolution order of the source map.
    pub depth: u8,
    /// Selected nested pixel indices, sorted ascending.
    pub pixels: Vec<u64>,
    /// Cumulative probability actually enclosed (may exceed the requested
    /// confidence by up to one pixel's mass, or fall short of it when the
    /// whole map sums to less).
    pub probability: f64,
}

impl CredibleRegion {
    /// Solid angle of the region in steradians.
    pub fn solid_angle(&self) -> f64 {
        healpix::pixel_area(self.depth) * self.pixels.len() as f64
    }

    /// Sky positions (lon, lat) of the selected pixel centers, in radians,
    /// in ascending pixel-index order.
    pub fn pixel_centers(&self) -> Vec<(f64, f64)> {
        self.pixels
            .iter()
            .map(|&p| healpix::nested_to_center(p, self.depth))
            .collect()
    }
}

/// Extract the credible region enclosing `confidence` probability mass.
///
/// `probs` is a full-sky map in nested order, one value per pixel; its length
/// fixes the resolution order. The selection policy is the smallest prefix of
/// the descending-probability ordering whose cumulative sum reaches
/// `confidence` (ties broken by ascending pixel index). If the total mass of
/// the map falls short of `confidence` — normalization drift upstream — every
/// pixel is selected and no error is raised.
pub fn credible_pixels(probs: &[f64], confidence: f64) -> Result<CredibleRegion, RegionError> {
    if !(confidence > 0.0 && confidence <= 1.0) {
        return Err(RegionError::InvalidConfidence(confidence));
    }
    let Some(depth) = healpix::depth_for_npix(probs.len()) else {
        return Err(RegionError::MalformedMap {
            len: probs.len(),
            detail: "length is not 12 * 4^k",
        });
    };
    if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(RegionError::MalformedMap {
            len: probs.len(),
            detail: "values must be finite and non-negative",
        });
    }

    // Descending by probability, ascending by pixel index on ties. The
    // explicit index tie-break keeps the selection deterministic.
    let mut order: Vec<u64> = (0..probs.len() as u64).collect();
    order.sort_unstable_by(|&a, &b| {
        probs[b as usize]
            .total_cmp(&probs[a as usize])
            .then(a.cmp(&b))
    });

    let mut cum = 0.0;
    let mut taken = order.len();
    let mut enclosed = 0.0;
    for (i, &pix) in order.iter().enumerate() {
        cum += probs[pix as usize];
        if cum + CONFIDENCE_TOL >= confidence {
            taken = i + 1;
            enclosed = cum;
            break;
        }
    }
    if taken == order.len() {
        // Total mass never reached the target; take the whole map.
        enclosed = cum;
    }

    let mut pixels = order[..taken].to_vec();
    pixels.sort_unstable();

    Ok(CredibleRegion {
        depth,
        pixels,
        probability: enclosed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_map(depth: u8) -> Vec<f64> {
        let n = healpix::npix(depth) as usize;
        vec![1.0 / n as f64; n]
    }

    #[test]
    fn rejects_bad_confidence() {
        let map = uniform_map(0);
        for c in [0.0, -0.5, 1.0000001, f64::NAN, f64::INFINITY] {
            let err = credible_pixels(&map, c).unwrap_err();
            assert!(matches!(err, RegionError::InvalidConfidence(_)), "c={c}");
        }
    }

    #[test]
    fn rejects_bad_length() {
        for n in [0, 1, 11, 13, 100] {
            let err = credible_pixels(&vec![0.1; n], 0.9).unwrap_err();
            assert!(matches!(err, RegionError::MalformedMap { .. }), "n={n}");
        }
    }

    #[test]
    fn rejects_bad_values() {
        let mut map = uniform_map(0);
        map[3] = -0.01;
        assert!(matches!(
            credible_pixels(&map, 0.9),
            Err(RegionError::MalformedMap { .. })
        ));

        let mut map = uniform_map(0);
        map[3] = f64::NAN;
        assert!(credible_pixels(&map, 0.9).is_err());
    }

    #[test]
    fn uniform_half_selects_half() {
        // 48 equal pixels, confidence 0.5: exactly 24 pixels, and the index
        // tie-break picks the lowest 24.
        let map = uniform_map(1);
        let region = credible_pixels(&map, 0.5).unwrap();
        assert_eq!(region.depth, 1);
        assert_eq!(region.pixels, (0..24).collect::<Vec<u64>>());
        assert!((region.probability - 0.5).abs() < 1e-9);
    }

    #[test]
    fn dominant_pixel_selected_alone() {
        // One pixel holds 0.95; confidence 0.9 needs only that pixel.
        let mut map = vec![0.05 / 11.0; 12];
        map[7] = 0.95;
        let region = credible_pixels(&map, 0.9).unwrap();
        assert_eq!(region.pixels, vec![7]);
        assert!((region.probability - 0.95).abs() < 1e-12);
    }

    #[test]
    fn full_confidence_takes_everything_uniform() {
        let map = uniform_map(1);
        let region = credible_pixels(&map, 1.0).unwrap();
        assert_eq!(region.pixels.len(), 48);
    }

    #[test]
    fn under_normalized_map_selects_all() {
        // Total mass 0.999999 with confidence 1.0: all pixels, no error.
        let map = vec![0.999999 / 12.0; 12];
        let region = credible_pixels(&map, 1.0).unwrap();
        assert_eq!(region.pixels.len(), 12);
        assert!(region.probability < 1.0);
    }

    #[test]
    fn ties_broken_by_index() {
        // Two equal maxima: the lower index wins when one pixel suffices.
        let mut map = vec![0.0125; 12];
        map[9] = 0.425;
        map[2] = 0.425;
        let region = credible_pixels(&map, 0.4).unwrap();
        assert_eq!(region.pixels, vec![2]);
    }

    #[test]
    fn deterministic() {
        let map: Vec<f64> = (0..48).map(|i| (i as f64 + 1.0) / 1176.0).collect();
        let a = credible_pixels(&map, 0.7).unwrap();
        let b = credible_pixels(&map, 0.7).unwrap();
        assert_eq!(a.pixels, b.pixels);
        assert_eq!(a.probability, b.probability);
    }

    #[test]
    fn solid_angle_monotone_in_confidence() {
        let map: Vec<f64> = (0..192).map(|i| (i as f64 + 1.0) / 18528.0).collect();
        let mut last = 0.0;
        for c in [0.1, 0.3, 0.5, 0.7, 0.9, 0.99, 1.0] {
            let region = credible_pixels(&map, c).unwrap();
            let area = region.solid_angle();
            assert!(area >= last, "area shrank at c={c}");
            last = area;
        }
    }

    #[test]
    fn zero_probability_pixels_excluded() {
        // Mass concentrated in 4 pixels; the zero pixels never enter.
        let mut map = vec![0.0; 12];
        for i in 0..4 {
            map[i] = 0.25;
        }
        let region = credible_pixels(&map, 1.0).unwrap();
        assert_eq!(region.pixels, vec![0, 1, 2, 3]);
    }

    #[test]
    fn pixel_centers_match_selection() {
        let mut map = vec![0.0; 12];
        map[5] = 1.0;
        let region = credible_pixels(&map, 0.5).unwrap();
        let centers = region.pixel_centers();
        assert_eq!(centers.len(), 1);
        let (lon, lat) = centers[0];
        assert_eq!(healpix::lon_lat_to_nested(lon, lat, 0), 5);
    }
}
