//! Deisotoping and charge reduction.
//!
//! [`ReductionEngine::reduce`] runs four phases over a peak list:
//! 1. Assign charges with a [`ChargeAssignmentEngine`].
//! 2. Deplete the predicted isotope peak intensity of every charged peak from its satellites.
//! 3. Move the intensity of every multiply charged peak onto a singly charged peak at the
//!    equivalent m/z, merging with an existing singly charged peak when one is in tolerance
//!    and synthesizing a new one otherwise.
//! 4. Keep the original peaks above the intensity threshold and every synthesized peak.
use tracing::{debug, trace};

use crate::charge::ChargeAssignmentEngine;
use crate::isotopic_model::{IsotopeAbundanceEstimator, MIN_MONOISOTOPIC_ABUNDANCE, PROTON};
use crate::matcher::PeakMatcher;
use crate::params::{ParameterError, ReductionParams};
use crate::peaks::{singly_charged_mz, sort_by_mz, Peak, PeakList, Tristate};

/// Where a multiply charged peak's intensity went during charge reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducedInto {
    /// Merged into an existing singly charged peak of the input at this index
    Original(usize),
    /// Merged into a previously synthesized peak
    Synthesized,
    /// Promoted into a newly synthesized peak
    Promoted,
}

/// Collapses multiply charged species into deisotoped, singly charged peaks.
///
/// The engine owns its abundance estimator, so any cache the estimator keeps survives across
/// calls to [`ReductionEngine::reduce`].
#[derive(Debug, Clone)]
pub struct ReductionEngine<E: IsotopeAbundanceEstimator> {
    params: ReductionParams,
    matcher: PeakMatcher,
    charge_engine: ChargeAssignmentEngine<E>,
}

impl<E: IsotopeAbundanceEstimator> ReductionEngine<E> {
    pub fn new(params: ReductionParams, estimator: E) -> Self {
        Self {
            matcher: params.matcher(),
            charge_engine: ChargeAssignmentEngine::new(params.charge_assignment_params(), estimator),
            params,
        }
    }

    /// Create a new engine after checking `params` are usable
    pub fn try_new(params: ReductionParams, estimator: E) -> Result<Self, ParameterError> {
        params.validate()?;
        Ok(Self::new(params, estimator))
    }

    pub fn params(&self) -> &ReductionParams {
        &self.params
    }

    pub fn matcher(&self) -> &PeakMatcher {
        &self.matcher
    }

    pub fn charge_engine(&self) -> &ChargeAssignmentEngine<E> {
        &self.charge_engine
    }

    pub fn estimator(&self) -> &E {
        self.charge_engine.estimator()
    }

    pub fn estimator_mut(&mut self) -> &mut E {
        self.charge_engine.estimator_mut()
    }

    pub fn into_estimator(self) -> E {
        self.charge_engine.into_estimator()
    }

    /// Sort `peaks` by m/z and assign charges to them
    pub fn assign_charges(&mut self, peaks: &mut [Peak]) -> usize {
        sort_by_mz(peaks);
        self.charge_engine.assign_charges_sorted(peaks)
    }

    /// Subtract the predicted isotope peak intensities of every charged peak from the peaks
    /// matched at its isotope positions. `peaks` must be sorted by m/z.
    ///
    /// Intensities may become negative unless `clamp_depleted_intensity` is set. Returns the
    /// number of satellite peaks depleted.
    pub fn deplete_isotopes(&mut self, peaks: &mut [Peak]) -> usize {
        let mut n_depleted = 0;
        for i in 0..peaks.len() {
            let (mz, intensity) = (peaks[i].mz, peaks[i].intensity);
            let Some(charge) = peaks[i].charge.filter(|z| *z > 0) else {
                continue;
            };
            if intensity <= 0.0 {
                continue;
            }

            let mass = singly_charged_mz(mz, charge);
            let abundances = self.charge_engine.estimator_mut().abundances(mass);
            let Some(mono) = abundances.first().copied() else {
                continue;
            };
            if !mono.is_finite() || mono <= MIN_MONOISOTOPIC_ABUNDANCE {
                continue;
            }

            for (isotope, abundance) in abundances.iter().copied().enumerate().skip(1) {
                if abundance == 0.0 || !abundance.is_finite() {
                    continue;
                }
                let isotope_mz = mz + isotope as f64 * PROTON / charge as f64;
                let Some(k) = self.matcher.find_index(peaks, isotope_mz) else {
                    continue;
                };
                if k == i {
                    continue;
                }
                let satellite = &mut peaks[k];
                satellite.intensity -= intensity * abundance / mono;
                if self.params.clamp_depleted_intensity && satellite.intensity < 0.0 {
                    satellite.intensity = 0.0;
                }
                trace!(
                    "Depleted isotope {isotope} of {mz:0.4} at {:0.4}, {:0.2} remaining",
                    satellite.mz,
                    satellite.intensity
                );
                n_depleted += 1;
            }
        }
        n_depleted
    }

    /// Find the singly charged peak closest to `target_mz` in `peaks`
    fn find_singly_charged(&self, peaks: &[Peak], target_mz: f64) -> Option<usize> {
        self.matcher
            .find_closest_where(peaks, target_mz, |p| p.charge == Some(1))
    }

    /// Move the intensity of the multiply charged peak at `index` onto a singly charged peak
    fn reduce_peak(
        &self,
        peaks: &mut [Peak],
        index: usize,
        synthesized: &mut Vec<Peak>,
    ) -> Option<ReducedInto> {
        let peak = &peaks[index];
        let (intensity, centroided) = (peak.intensity, peak.centroided);
        let target_mz = peak.singly_charged_mz()?;

        let outcome = if let Some(k) = self.find_singly_charged(peaks, target_mz) {
            peaks[k].intensity += intensity;
            ReducedInto::Original(k)
        } else if let Some(k) = self.find_singly_charged(synthesized, target_mz) {
            synthesized[k].intensity += intensity;
            ReducedInto::Synthesized
        } else {
            let promoted = Peak {
                mz: target_mz,
                intensity,
                charge: Some(1),
                centroided,
                monoisotopic: Tristate::Unknown,
                deisotoped: Tristate::Yes,
            };
            let at = synthesized.partition_point(|p| p.mz < target_mz);
            synthesized.insert(at, promoted);
            ReducedInto::Promoted
        };
        trace!(
            "Reduced {:0.4} (z={:?}) into {target_mz:0.4}: {outcome:?}",
            peaks[index].mz,
            peaks[index].charge
        );
        peaks[index].intensity = 0.0;
        Some(outcome)
    }

    /// Fold every multiply charged peak with positive intensity into its singly charged
    /// equivalent. `peaks` must be sorted by m/z.
    ///
    /// Returns the peaks synthesized along the way, sorted by m/z.
    pub fn reduce_charges(&mut self, peaks: &mut [Peak]) -> Vec<Peak> {
        let mut synthesized = Vec::new();
        for i in 0..peaks.len() {
            let multiply_charged = matches!(peaks[i].charge, Some(z) if z > 1);
            if multiply_charged && peaks[i].intensity > 0.0 {
                self.reduce_peak(peaks, i, &mut synthesized);
            }
        }
        synthesized
    }

    /// Keep the original peaks strictly above the intensity threshold and every synthesized
    /// peak, marked as deisotoped and sorted by m/z.
    pub fn select_survivors(&self, peaks: Vec<Peak>, synthesized: Vec<Peak>) -> Vec<Peak> {
        let threshold = self.params.intensity_threshold;
        let mut survivors: Vec<Peak> = peaks
            .into_iter()
            .filter(|p| p.intensity > threshold)
            .chain(synthesized)
            .map(|mut p| {
                p.deisotoped = Tristate::Yes;
                p
            })
            .collect();
        sort_by_mz(&mut survivors);
        survivors
    }

    /// Deisotope `peak_list` and reduce every peak to charge 1, producing a new sorted
    /// peak list that carries the same precursor metadata.
    #[tracing::instrument(level = "debug", skip_all, fields(n_peaks = peak_list.len()))]
    pub fn reduce(&mut self, peak_list: PeakList) -> PeakList {
        let (mut peaks, shell) = peak_list.into_parts();
        if peaks.is_empty() {
            return shell;
        }

        let n_charged = self.assign_charges(&mut peaks);
        let n_depleted = self.deplete_isotopes(&mut peaks);
        let synthesized = self.reduce_charges(&mut peaks);
        let n_synthesized = synthesized.len();
        let survivors = self.select_survivors(peaks, synthesized);
        debug!(
            "{n_charged} peaks charged, {n_depleted} isotope peaks depleted, {n_synthesized} peaks synthesized, {} peaks retained",
            survivors.len()
        );
        shell.with_peaks(survivors)
    }
}
