//! The peak and peak list value types the engines consume and produce.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::slice;
use std::sync::Arc;
use std::vec;

use mzpeaks::{
    CentroidPeak, CoordinateLike, DeconvolutedPeak, IntensityMeasurement, MZPeakSetType, MZ,
};

use crate::isotopic_model::PROTON;

/// A three-valued processing flag. A property may be known to hold, known not to hold,
/// or simply not have been determined.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tristate {
    #[default]
    Unknown,
    Yes,
    No,
}

impl Tristate {
    pub fn is_yes(&self) -> bool {
        matches!(self, Self::Yes)
    }

    pub fn is_no(&self) -> bool {
        matches!(self, Self::No)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value {
            Self::Yes
        } else {
            Self::No
        }
    }
}

impl From<Option<bool>> for Tristate {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Self::Unknown,
        }
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A single centroided signal with an optional charge state and processing flags.
///
/// Field order matters: the derived [`PartialOrd`] compares `mz` first, so peaks order
/// by m/z ascending.
#[derive(Debug, Default, Clone, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
    /// The charge state, or `None` if it is not known
    pub charge: Option<u32>,
    pub centroided: Tristate,
    pub monoisotopic: Tristate,
    pub deisotoped: Tristate,
}

impl Peak {
    pub fn new(mz: f64, intensity: f64) -> Self {
        Self {
            mz,
            intensity,
            ..Default::default()
        }
    }

    pub fn with_charge(mz: f64, intensity: f64, charge: u32) -> Self {
        Self {
            mz,
            intensity,
            charge: Some(charge),
            ..Default::default()
        }
    }

    pub fn has_charge(&self) -> bool {
        self.charge.is_some()
    }

    /// The m/z this peak would have were it carrying a single proton.
    ///
    /// Returns `None` when the charge is unknown.
    pub fn singly_charged_mz(&self) -> Option<f64> {
        self.charge.map(|z| singly_charged_mz(self.mz, z))
    }

    /// Convert to a neutral mass peak if the charge state is known.
    pub fn to_deconvoluted(&self) -> Option<DeconvolutedPeak> {
        self.charge.map(|z| {
            let z = z as f64;
            DeconvolutedPeak {
                neutral_mass: self.mz * z - z * PROTON,
                intensity: self.intensity as f32,
                charge: z as i32,
                index: 0,
            }
        })
    }
}

/// Convert an m/z observed at `charge` into the m/z of the same species carrying one proton.
#[inline]
pub fn singly_charged_mz(mz: f64, charge: u32) -> f64 {
    let z = charge as f64;
    mz * z - (z - 1.0) * PROTON
}

impl fmt::Display for Peak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.charge {
            Some(z) => write!(f, "Peak({}, {}, {})", self.mz, self.intensity, z),
            None => write!(f, "Peak({}, {}, ?)", self.mz, self.intensity),
        }
    }
}

impl CoordinateLike<MZ> for Peak {
    #[inline]
    fn coordinate(&self) -> f64 {
        self.mz
    }
}

impl IntensityMeasurement for Peak {
    #[inline]
    fn intensity(&self) -> f32 {
        self.intensity as f32
    }
}

impl From<CentroidPeak> for Peak {
    fn from(value: CentroidPeak) -> Self {
        Self {
            mz: value.mz,
            intensity: value.intensity as f64,
            centroided: Tristate::Yes,
            ..Default::default()
        }
    }
}

impl From<&Peak> for CentroidPeak {
    fn from(value: &Peak) -> Self {
        CentroidPeak::new(value.mz, value.intensity as f32, 0)
    }
}

/// Sort peaks by m/z ascending, keeping the input order of peaks with equal m/z.
pub(crate) fn sort_by_mz(peaks: &mut [Peak]) {
    peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
}

/// An ordered collection of [`Peak`]s with optional precursor metadata.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PeakList {
    peaks: Vec<Peak>,
    parent_peak: Option<Peak>,
    parent_list: Option<Arc<PeakList>>,
}

impl PeakList {
    pub fn new(peaks: Vec<Peak>) -> Self {
        Self {
            peaks,
            parent_peak: None,
            parent_list: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach the precursor ion this peak list was produced from
    pub fn with_parent_peak(mut self, parent_peak: Peak) -> Self {
        self.parent_peak = Some(parent_peak);
        self
    }

    /// Attach the peak list the precursor ion was selected from
    pub fn with_parent_list(mut self, parent_list: Arc<PeakList>) -> Self {
        self.parent_list = Some(parent_list);
        self
    }

    pub fn parent_peak(&self) -> Option<&Peak> {
        self.parent_peak.as_ref()
    }

    pub fn parent_list(&self) -> Option<&Arc<PeakList>> {
        self.parent_list.as_ref()
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Peak> {
        self.peaks.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<'_, Peak> {
        self.peaks.iter_mut()
    }

    pub fn as_slice(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn as_mut_slice(&mut self) -> &mut [Peak] {
        &mut self.peaks
    }

    pub fn push(&mut self, peak: Peak) {
        self.peaks.push(peak)
    }

    pub fn tic(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).sum()
    }

    pub fn sort(&mut self) {
        sort_by_mz(&mut self.peaks)
    }

    pub fn is_sorted(&self) -> bool {
        self.peaks.windows(2).all(|w| w[0].mz <= w[1].mz)
    }

    /// Split into the peaks and a metadata-only shell that [`PeakList::with_peaks`]
    /// can fill again.
    pub fn into_parts(self) -> (Vec<Peak>, PeakList) {
        let Self {
            peaks,
            parent_peak,
            parent_list,
        } = self;
        (
            peaks,
            Self {
                peaks: Vec::new(),
                parent_peak,
                parent_list,
            },
        )
    }

    /// Replace the peaks, keeping the precursor metadata
    pub fn with_peaks(mut self, peaks: Vec<Peak>) -> Self {
        self.peaks = peaks;
        self
    }

    pub fn into_peaks(self) -> Vec<Peak> {
        self.peaks
    }

    pub fn to_centroids(&self) -> MZPeakSetType<CentroidPeak> {
        self.peaks.iter().map(CentroidPeak::from).collect()
    }
}

impl Index<usize> for PeakList {
    type Output = Peak;

    fn index(&self, index: usize) -> &Self::Output {
        &self.peaks[index]
    }
}

impl IndexMut<usize> for PeakList {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.peaks[index]
    }
}

impl FromIterator<Peak> for PeakList {
    fn from_iter<T: IntoIterator<Item = Peak>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for PeakList {
    type Item = Peak;
    type IntoIter = vec::IntoIter<Peak>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.into_iter()
    }
}

impl<'a> IntoIterator for &'a PeakList {
    type Item = &'a Peak;
    type IntoIter = slice::Iter<'a, Peak>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.iter()
    }
}

impl From<Vec<Peak>> for PeakList {
    fn from(value: Vec<Peak>) -> Self {
        Self::new(value)
    }
}

impl From<MZPeakSetType<CentroidPeak>> for PeakList {
    fn from(value: MZPeakSetType<CentroidPeak>) -> Self {
        value.iter().cloned().map(Peak::from).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use mzpeaks::prelude::PeakCollection;

    #[test]
    fn test_ordering() {
        let a = Peak::new(100.0, 5.0);
        let b = Peak::new(100.5, 1.0);
        assert!(a < b);

        let mut peaks = vec![b.clone(), a.clone(), Peak::new(100.0, 2.0)];
        sort_by_mz(&mut peaks);
        assert_eq!(peaks[0], a);
        assert_eq!(peaks[1].intensity, 2.0);
        assert_eq!(peaks[2], b);
    }

    #[test]
    fn test_tristate() {
        assert_eq!(Tristate::default(), Tristate::Unknown);
        assert_eq!(Tristate::from(true), Tristate::Yes);
        assert_eq!(Tristate::from(Some(false)), Tristate::No);
        assert!(Tristate::from(None).is_unknown());
    }

    #[test]
    fn test_singly_charged() {
        let peak = Peak::with_charge(550.0, 5000.0, 2);
        let mz = peak.singly_charged_mz().unwrap();
        assert!((mz - (1100.0 - PROTON)).abs() < 1e-9);
        assert_eq!(Peak::new(550.0, 1.0).singly_charged_mz(), None);

        let peak = Peak::with_charge(300.0, 10.0, 1);
        assert_eq!(peak.singly_charged_mz(), Some(300.0));
    }

    #[test]
    fn test_deconvoluted() {
        let peak = Peak::with_charge(500.0, 100.0, 2);
        let dpeak = peak.to_deconvoluted().unwrap();
        assert!((dpeak.neutral_mass - (1000.0 - 2.0 * PROTON)).abs() < 1e-9);
        assert_eq!(dpeak.charge, 2);
        assert!(Peak::new(500.0, 1.0).to_deconvoluted().is_none());
    }

    #[test]
    fn test_centroid_conversion() {
        let peaks: MZPeakSetType<CentroidPeak> = vec![
            CentroidPeak::new(200.0, 10.0, 0),
            CentroidPeak::new(100.0, 20.0, 0),
        ]
        .into_iter()
        .collect();
        let peak_list = PeakList::from(peaks);
        assert_eq!(peak_list.len(), 2);
        assert!(peak_list.is_sorted());
        assert!(peak_list.iter().all(|p| p.centroided.is_yes()));
        assert_eq!(peak_list.to_centroids().len(), 2);
    }

    #[test]
    fn test_parts() {
        let parent = Peak::with_charge(800.0, 1e5, 3);
        let peak_list = PeakList::new(vec![Peak::new(100.0, 1.0)]).with_parent_peak(parent.clone());
        let (peaks, shell) = peak_list.into_parts();
        assert_eq!(peaks.len(), 1);
        assert!(shell.is_empty());
        let rebuilt = shell.with_peaks(peaks);
        assert_eq!(rebuilt.parent_peak(), Some(&parent));
        assert_eq!(rebuilt.len(), 1);
    }
}
