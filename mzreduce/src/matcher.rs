//! Tolerance-aware nearest peak lookup over m/z-sorted peak arrays.
//!
//! Every search in this module assumes the peaks are sorted by m/z ascending. Unsorted
//! input is not detected and silently produces wrong matches.
use std::ops::Range;

use mzpeaks::{CoordinateLike, IntensityMeasurement, Tolerance, MZ};

/// The mass accuracy rule for a [`PeakMatcher`]: a relative tolerance in parts-per-million
/// with an absolute floor in Daltons.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakMatcher {
    pub ppm_tolerance: f64,
    pub min_tolerance: f64,
}

impl Default for PeakMatcher {
    fn default() -> Self {
        Self {
            ppm_tolerance: 10.0,
            min_tolerance: 0.05,
        }
    }
}

#[inline]
fn mz_of<C: CoordinateLike<MZ>>(peak: &C) -> f64 {
    CoordinateLike::<MZ>::coordinate(peak)
}

impl PeakMatcher {
    pub fn new(ppm_tolerance: f64, min_tolerance: f64) -> Self {
        Self {
            ppm_tolerance,
            min_tolerance,
        }
    }

    /// The width of the matching window around `mz`, in Daltons
    #[inline]
    pub fn tolerance_at(&self, mz: f64) -> f64 {
        (self.ppm_tolerance * mz / 1e6).max(self.min_tolerance)
    }

    /// Express the matching window around `mz` as an absolute [`Tolerance`]
    #[inline]
    pub fn as_tolerance(&self, mz: f64) -> Tolerance {
        Tolerance::Da(self.tolerance_at(mz))
    }

    /// Test whether `query` is within the matching window around `target`
    #[inline]
    pub fn test(&self, query: f64, target: f64) -> bool {
        self.as_tolerance(target).test(query, target)
    }

    /// The index at which a peak at `mz` would be inserted to keep `peaks` sorted
    #[inline]
    fn insertion_point<C: CoordinateLike<MZ>>(peaks: &[C], mz: f64) -> usize {
        peaks.partition_point(|p| mz_of(p) < mz)
    }

    /// Find the index of the peak closest to `mz` within tolerance.
    ///
    /// Only the two peaks that bracket the insertion point of `mz` are considered. When
    /// both are equally close, the lower m/z peak wins. Arrays with fewer than two peaks
    /// never match.
    pub fn find_index<C: CoordinateLike<MZ>>(&self, peaks: &[C], mz: f64) -> Option<usize> {
        if peaks.len() < 2 {
            return None;
        }
        let tolerance = self.as_tolerance(mz);
        let i = Self::insertion_point(peaks, mz);

        let mut best: Option<(usize, f64)> = None;
        for j in [i.checked_sub(1), Some(i)].into_iter().flatten() {
            let Some(peak) = peaks.get(j) else {
                continue;
            };
            let peak_mz = mz_of(peak);
            if !tolerance.test(peak_mz, mz) {
                continue;
            }
            let err = (peak_mz - mz).abs();
            match best {
                Some((_, best_err)) if err >= best_err => {}
                _ => best = Some((j, err)),
            }
        }
        best.map(|(j, _)| j)
    }

    /// Find the peak closest to `mz` within tolerance. See [`PeakMatcher::find_index`].
    pub fn find<'a, C: CoordinateLike<MZ>>(&self, peaks: &'a [C], mz: f64) -> Option<&'a C> {
        self.find_index(peaks, mz).map(|i| &peaks[i])
    }

    /// The contiguous range of indices of peaks within tolerance of `mz`, found by walking
    /// outward from the insertion point of `mz`.
    ///
    /// Unlike [`PeakMatcher::find_index`], this has no minimum array length.
    pub fn window<C: CoordinateLike<MZ>>(&self, peaks: &[C], mz: f64) -> Range<usize> {
        let tolerance = self.as_tolerance(mz);
        let i = Self::insertion_point(peaks, mz);

        let mut start = i;
        while start > 0 && tolerance.test(mz_of(&peaks[start - 1]), mz) {
            start -= 1;
        }
        let mut end = i;
        while end < peaks.len() && tolerance.test(mz_of(&peaks[end]), mz) {
            end += 1;
        }
        start..end
    }

    /// Find the index of the most intense peak within tolerance of `mz`.
    ///
    /// Ties are broken in favor of the first such peak in m/z order. Arrays with fewer than
    /// two peaks never match. Intensities are compared as the `f32` that
    /// [`IntensityMeasurement`] reports, use [`PeakMatcher::find_most_intense_index_by`] to
    /// compare at full precision.
    pub fn find_most_intense_index<C: CoordinateLike<MZ> + IntensityMeasurement>(
        &self,
        peaks: &[C],
        mz: f64,
    ) -> Option<usize> {
        self.find_most_intense_index_by(peaks, mz, |p| p.intensity() as f64)
    }

    /// Find the index of the peak within tolerance of `mz` with the largest `intensity`.
    /// See [`PeakMatcher::find_most_intense_index`].
    pub fn find_most_intense_index_by<C: CoordinateLike<MZ>, F: Fn(&C) -> f64>(
        &self,
        peaks: &[C],
        mz: f64,
        intensity: F,
    ) -> Option<usize> {
        if peaks.len() < 2 {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for j in self.window(peaks, mz) {
            let value = intensity(&peaks[j]);
            match best {
                Some((_, best_value)) if value <= best_value => {}
                _ => best = Some((j, value)),
            }
        }
        best.map(|(j, _)| j)
    }

    /// Find the most intense peak within tolerance of `mz`.
    /// See [`PeakMatcher::find_most_intense_index`].
    pub fn find_most_intense<'a, C: CoordinateLike<MZ> + IntensityMeasurement>(
        &self,
        peaks: &'a [C],
        mz: f64,
    ) -> Option<&'a C> {
        self.find_most_intense_index(peaks, mz).map(|i| &peaks[i])
    }

    /// Find the index of the peak closest to `mz` within tolerance among those satisfying
    /// `predicate`, searching every peak in the window.
    pub fn find_closest_where<C: CoordinateLike<MZ>, F: Fn(&C) -> bool>(
        &self,
        peaks: &[C],
        mz: f64,
        predicate: F,
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for j in self.window(peaks, mz) {
            let peak = &peaks[j];
            if !predicate(peak) {
                continue;
            }
            let err = (mz_of(peak) - mz).abs();
            match best {
                Some((_, best_err)) if err >= best_err => {}
                _ => best = Some((j, err)),
            }
        }
        best.map(|(j, _)| j)
    }
}
