//! Charge state assignment from isotope peak spacing and relative abundance.
use std::ops::RangeInclusive;

use tracing::{debug, trace};

use crate::isotopic_model::{IsotopeAbundanceEstimator, PROTON};
use crate::matcher::PeakMatcher;
use crate::params::{ChargeAssignmentParams, ParameterError};
use crate::peaks::{singly_charged_mz, sort_by_mz, Peak, PeakList};

pub use crate::params::AssignmentTarget;

/// The charge states to try, from 1 up to `max_charge_state`
#[inline]
pub fn charge_range(max_charge_state: u32) -> RangeInclusive<u32> {
    1..=max_charge_state
}

/// The evidence for one charge state of one peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeTrial {
    pub charge: u32,
    /// The index of the peak matched as the next isotope
    pub matched_index: usize,
    /// The relative difference between the predicted and observed next isotope intensity
    pub deviation: f64,
}

impl ChargeTrial {
    pub fn new(charge: u32, matched_index: usize, deviation: f64) -> Self {
        Self {
            charge,
            matched_index,
            deviation,
        }
    }

    /// Whether `self` is better evidence than `other`. Charges are tried in ascending order,
    /// so a tie goes to `other`, the lower charge.
    fn is_better_than(&self, other: &Self) -> bool {
        self.deviation < other.deviation
    }
}

/// Assigns a charge state to every peak of a peak list by looking for the next isotope
/// peak at `PROTON / z` above it and comparing its intensity with the intensity the
/// abundance estimator predicts.
#[derive(Debug, Clone)]
pub struct ChargeAssignmentEngine<E: IsotopeAbundanceEstimator> {
    params: ChargeAssignmentParams,
    matcher: PeakMatcher,
    estimator: E,
}

impl<E: IsotopeAbundanceEstimator> ChargeAssignmentEngine<E> {
    pub fn new(params: ChargeAssignmentParams, estimator: E) -> Self {
        Self {
            matcher: params.matcher(),
            params,
            estimator,
        }
    }

    /// Create a new engine after checking `params` are usable
    pub fn try_new(params: ChargeAssignmentParams, estimator: E) -> Result<Self, ParameterError> {
        params.validate()?;
        Ok(Self::new(params, estimator))
    }

    pub fn params(&self) -> &ChargeAssignmentParams {
        &self.params
    }

    pub fn matcher(&self) -> &PeakMatcher {
        &self.matcher
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut E {
        &mut self.estimator
    }

    pub fn into_estimator(self) -> E {
        self.estimator
    }

    /// Test whether the peak at `index` could carry `charge`.
    ///
    /// Returns `None` when no next isotope peak is found, when the estimator can't predict
    /// its intensity, or when the observed intensity deviates too much from the prediction.
    pub fn evaluate_charge(
        &mut self,
        peaks: &[Peak],
        index: usize,
        charge: u32,
    ) -> Option<ChargeTrial> {
        let peak = peaks.get(index)?;
        let next_mz = peak.mz + PROTON / charge as f64;
        let matched_index = self.matcher.find_index(peaks, next_mz)?;
        if matched_index == index {
            return None;
        }

        let mass = singly_charged_mz(peak.mz, charge);
        let ratio = self.estimator.relative_to_monoisotopic(mass, 1)?;
        let expected = peak.intensity * ratio;
        if !(expected.is_finite() && expected > 0.0) {
            return None;
        }
        let observed = peaks[matched_index].intensity;
        let deviation = (expected - observed).abs() / expected;
        if deviation <= self.params.allowed_isotope_deviation {
            Some(ChargeTrial::new(charge, matched_index, deviation))
        } else {
            None
        }
    }

    /// Find the best supported charge for the peak at `index`, if any
    pub fn best_charge(&mut self, peaks: &[Peak], index: usize) -> Option<ChargeTrial> {
        let mut best: Option<ChargeTrial> = None;
        for charge in charge_range(self.params.max_charge_state) {
            if let Some(trial) = self.evaluate_charge(peaks, index, charge) {
                match best {
                    Some(ref current) if !trial.is_better_than(current) => {}
                    _ => best = Some(trial),
                }
            }
        }
        best
    }

    /// Assign charges to `peaks`, which must already be sorted by m/z.
    ///
    /// Charges the input already carries outside of `1..=max_charge_state` are discarded.
    ///
    /// Returns the number of peaks that ended with a known charge.
    pub fn assign_charges_sorted(&mut self, peaks: &mut [Peak]) -> usize {
        let allowed = charge_range(self.params.max_charge_state);
        for peak in peaks.iter_mut() {
            if peak.charge.is_some_and(|z| !allowed.contains(&z)) {
                trace!("Discarding charge {:?} of {:0.4}", peak.charge, peak.mz);
                peak.charge = None;
            }
        }
        for i in 0..peaks.len() {
            let Some(trial) = self.best_charge(peaks, i) else {
                // Keep any charge this peak was given as an earlier peak's isotope
                continue;
            };
            trace!(
                "Assigned charge {} to {:0.4} (deviation {:0.3}, isotope at {:0.4})",
                trial.charge,
                peaks[i].mz,
                trial.deviation,
                peaks[trial.matched_index].mz,
            );
            peaks[i].charge = Some(trial.charge);
            let target = match self.params.assignment_target {
                AssignmentTarget::MatchedPeak => Some(trial.matched_index),
                AssignmentTarget::AdjacentPeak => Some(i + 1).filter(|j| *j < peaks.len()),
            };
            if let Some(j) = target {
                peaks[j].charge = Some(trial.charge);
            }
        }
        peaks.iter().filter(|p| p.has_charge()).count()
    }

    /// Assign a charge state or leave it unknown for every peak in `peak_list`.
    ///
    /// The result is sorted by m/z. Peak m/z and intensity are never modified.
    #[tracing::instrument(level = "debug", skip_all, fields(n_peaks = peak_list.len()))]
    pub fn assign_charges(&mut self, peak_list: PeakList) -> PeakList {
        let (mut peaks, shell) = peak_list.into_parts();
        sort_by_mz(&mut peaks);
        let n_charged = self.assign_charges_sorted(&mut peaks);
        debug!("{n_charged} of {} peaks have a known charge", peaks.len());
        shell.with_peaks(peaks)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn half_next_isotope(_mass: f64) -> Vec<f64> {
        vec![1.0, 0.5, 0.1]
    }

    fn doublet() -> PeakList {
        PeakList::new(vec![
            Peak::new(500.0, 1000.0),
            Peak::new(500.0 + PROTON / 2.0, 500.0),
        ])
    }

    #[test_log::test]
    fn test_doubly_charged_pair() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        let result = engine.assign_charges(doublet());
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].charge, Some(2));
        assert_eq!(result[1].charge, Some(2));
        assert_eq!(result[0].intensity, 1000.0);
        assert_eq!(result[1].mz, 500.0 + PROTON / 2.0);
    }

    #[test_log::test]
    fn test_isolated_peak() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        let peaks = PeakList::new(vec![Peak::new(300.0, 100.0), Peak::new(700.0, 100.0)]);
        let result = engine.assign_charges(peaks);
        assert!(result.iter().all(|p| p.charge.is_none()));
    }

    #[test_log::test]
    fn test_deviation_rejects() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        let peaks = PeakList::new(vec![
            Peak::new(500.0, 1000.0),
            Peak::new(500.0 + PROTON / 2.0, 700.0),
        ]);
        let result = engine.assign_charges(peaks);
        assert_eq!(result[0].charge, None);

        let mut engine = ChargeAssignmentEngine::new(
            ChargeAssignmentParams::default().with_allowed_isotope_deviation(0.5),
            half_next_isotope,
        );
        let peaks = PeakList::new(vec![
            Peak::new(500.0, 1000.0),
            Peak::new(500.0 + PROTON / 2.0, 700.0),
        ]);
        let result = engine.assign_charges(peaks);
        assert_eq!(result[0].charge, Some(2));
    }

    #[test]
    fn test_max_charge_limits_trials() {
        let mut engine = ChargeAssignmentEngine::new(
            ChargeAssignmentParams::default().with_max_charge_state(1),
            half_next_isotope,
        );
        let result = engine.assign_charges(doublet());
        assert!(result.iter().all(|p| p.charge.is_none()));
    }

    #[test]
    fn test_degenerate_abundances() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), |_: f64| vec![0.0, 0.5]);
        let result = engine.assign_charges(doublet());
        assert!(result.iter().all(|p| p.charge.is_none()));

        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), |_: f64| vec![1.0]);
        let result = engine.assign_charges(doublet());
        assert!(result.iter().all(|p| p.charge.is_none()));
    }

    #[test]
    fn test_existing_charge_kept() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        let peaks = PeakList::new(vec![Peak::with_charge(300.0, 100.0, 3), Peak::new(700.0, 100.0)]);
        let result = engine.assign_charges(peaks);
        assert_eq!(result[0].charge, Some(3));
        assert_eq!(result[1].charge, None);
    }

    #[test]
    fn test_out_of_range_charge_discarded() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        let peaks = PeakList::new(vec![
            Peak::with_charge(300.0, 100.0, 9),
            Peak::with_charge(700.0, 100.0, 0),
            Peak::with_charge(900.0, 100.0, 4),
        ]);
        let result = engine.assign_charges(peaks);
        let charges: Vec<_> = result.iter().map(|p| p.charge).collect();
        assert_eq!(charges, vec![None, None, Some(4)]);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        let mut peaks = doublet().into_peaks();
        peaks.reverse();
        let result = engine.assign_charges(PeakList::new(peaks));
        assert!(result.is_sorted());
        assert_eq!(result[0].charge, Some(2));
    }

    #[test]
    fn test_lowest_deviation_wins() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        // 500.0 has a plausible z=1 partner at 90% of the expected height and an exact
        // z=2 partner.
        let peaks = vec![
            Peak::new(500.0, 1000.0),
            Peak::new(500.0 + PROTON / 2.0, 500.0),
            Peak::new(500.0 + PROTON, 450.0),
        ];
        let trial = engine.evaluate_charge(&peaks, 0, 1).unwrap();
        assert!((trial.deviation - 0.1).abs() < 1e-9);
        let best = engine.best_charge(&peaks, 0).unwrap();
        assert_eq!(best.charge, 2);
        assert_eq!(best.matched_index, 1);
    }

    #[test]
    fn test_tie_goes_to_lower_charge() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        let peaks = vec![
            Peak::new(500.0, 1000.0),
            Peak::new(500.0 + PROTON / 2.0, 500.0),
            Peak::new(500.0 + PROTON, 500.0),
        ];
        let best = engine.best_charge(&peaks, 0).unwrap();
        assert_eq!(best.charge, 1);
        assert_eq!(best.matched_index, 2);
    }

    #[test_log::test]
    fn test_assignment_targets() {
        let peaks = PeakList::new(vec![
            Peak::new(500.0, 1000.0),
            Peak::new(500.2, 10.0),
            Peak::new(500.0 + PROTON / 2.0, 500.0),
        ]);

        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        let result = engine.assign_charges(peaks.clone());
        let charges: Vec<_> = result.iter().map(|p| p.charge).collect();
        assert_eq!(charges, vec![Some(2), None, Some(2)]);

        let mut engine = ChargeAssignmentEngine::new(
            ChargeAssignmentParams::default().with_assignment_target(AssignmentTarget::AdjacentPeak),
            half_next_isotope,
        );
        let result = engine.assign_charges(peaks);
        let charges: Vec<_> = result.iter().map(|p| p.charge).collect();
        assert_eq!(charges, vec![Some(2), Some(2), None]);
    }

    #[test]
    fn test_empty() {
        let mut engine =
            ChargeAssignmentEngine::new(ChargeAssignmentParams::default(), half_next_isotope);
        let result = engine.assign_charges(PeakList::empty());
        assert!(result.is_empty());
    }

    #[test]
    fn test_try_new() {
        let params = ChargeAssignmentParams::default().with_max_charge_state(0);
        assert!(ChargeAssignmentEngine::try_new(params, half_next_isotope).is_err());
        assert!(
            ChargeAssignmentEngine::try_new(ChargeAssignmentParams::default(), half_next_isotope)
                .is_ok()
        );
    }
}
