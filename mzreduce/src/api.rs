use crate::charge::ChargeAssignmentEngine;
use crate::isotopic_model::IsotopeAbundanceEstimator;
use crate::params::{ChargeAssignmentParams, ReductionParams};
use crate::peaks::PeakList;
use crate::reduction::ReductionEngine;

/// A single-shot charge state assignment on the provided peak list.
///
/// # Arguments
/// - `peak_list`: The centroided peak list to annotate
/// - `params`: The charge range, isotope deviation and mass accuracy constraints
/// - `estimator`: The model that predicts the relative abundance of the next isotope peak
///
/// The returned peak list is sorted by m/z, and every peak carries a charge or is left unknown.
///
/// # Note
/// If you are calling this function with the same parameters on many peak lists, it
/// may be preferable to create a [`ChargeAssignmentEngine`] and call
/// [`ChargeAssignmentEngine::assign_charges`] so that a caching estimator like
/// [`CachingAbundanceModel`](crate::isotopic_model::CachingAbundanceModel) is kept alive
/// between calls.
pub fn assign_charges<E: IsotopeAbundanceEstimator>(
    peak_list: PeakList,
    params: ChargeAssignmentParams,
    estimator: E,
) -> PeakList {
    ChargeAssignmentEngine::new(params, estimator).assign_charges(peak_list)
}

/// A single-shot deisotoping and charge reduction of the provided peak list.
///
/// # Arguments
/// - `peak_list`: The centroided peak list to reduce
/// - `params`: The mass accuracy, charge range and intensity threshold for the reduction
/// - `estimator`: The model that predicts the relative abundances of isotope peaks
///
/// The returned peak list contains only singly charged or unknown charge peaks, sorted by m/z,
/// and carries the parent peak and parent peak list of `peak_list`.
///
/// See the note on [`assign_charges`] about using a [`ReductionEngine`] instead if called repeatedly.
///
/// # See also
/// [`ReductionEngine::reduce`]
pub fn deisotope_and_reduce<E: IsotopeAbundanceEstimator>(
    peak_list: PeakList,
    params: ReductionParams,
    estimator: E,
) -> PeakList {
    ReductionEngine::new(params, estimator).reduce(peak_list)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isotopic_model::{Averagine, CachingAbundanceModel, PROTON};
    use crate::peaks::Peak;

    #[test_log::test]
    fn test_empty() {
        let result = assign_charges(
            PeakList::empty(),
            ChargeAssignmentParams::default(),
            CachingAbundanceModel::from(Averagine::Peptide),
        );
        assert!(result.is_empty());
        let result = deisotope_and_reduce(
            PeakList::empty(),
            ReductionParams::default(),
            CachingAbundanceModel::from(Averagine::Peptide),
        );
        assert!(result.is_empty());
    }

    #[test_log::test]
    fn test_single_shot() {
        let peaks = PeakList::new(vec![
            Peak::new(500.0, 1000.0),
            Peak::new(500.0 + PROTON / 2.0, 500.0),
        ]);
        let estimator = |_: f64| vec![1.0, 0.5];
        let charged = assign_charges(peaks.clone(), ChargeAssignmentParams::default(), estimator);
        assert!(charged.iter().all(|p| p.charge == Some(2)));
        let reduced = deisotope_and_reduce(peaks, ReductionParams::default(), estimator);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].charge, Some(1));
    }
}
