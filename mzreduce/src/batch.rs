//! Reduce many peak lists with one engine, with cooperative cancellation between lists.
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::debug;

use crate::isotopic_model::IsotopeAbundanceEstimator;
use crate::peaks::PeakList;
use crate::reduction::ReductionEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("Batch cancelled after {completed} peak lists were reduced")]
    Cancelled { completed: usize },
}

#[inline]
fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

impl<E: IsotopeAbundanceEstimator> ReductionEngine<E> {
    /// Reduce each peak list in order.
    ///
    /// `cancel` is checked before each list is started. Once it is raised, the lists already
    /// reduced are discarded and [`BatchError::Cancelled`] reports how many there were.
    pub fn reduce_batch<I: IntoIterator<Item = PeakList>>(
        &mut self,
        peak_lists: I,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<PeakList>, BatchError> {
        let mut reduced = Vec::new();
        for peak_list in peak_lists {
            if is_cancelled(cancel) {
                debug!("Cancelled after {} peak lists", reduced.len());
                return Err(BatchError::Cancelled {
                    completed: reduced.len(),
                });
            }
            reduced.push(self.reduce(peak_list));
        }
        Ok(reduced)
    }
}

#[cfg(feature = "parallelism")]
mod parallel {
    use super::*;

    use rayon::prelude::*;

    impl<E: IsotopeAbundanceEstimator + Clone + Send + Sync> ReductionEngine<E> {
        /// Reduce each peak list on the `rayon` thread pool, giving each worker its own copy
        /// of this engine. The output is in the same order as the input.
        ///
        /// Lists not yet started when `cancel` is raised are skipped.
        pub fn par_reduce_batch(
            &self,
            peak_lists: Vec<PeakList>,
            cancel: Option<&AtomicBool>,
        ) -> Result<Vec<PeakList>, BatchError> {
            let n = peak_lists.len();
            let reduced: Vec<Option<PeakList>> = peak_lists
                .into_par_iter()
                .map_init(
                    || self.clone(),
                    |engine, peak_list| {
                        if is_cancelled(cancel) {
                            None
                        } else {
                            Some(engine.reduce(peak_list))
                        }
                    },
                )
                .collect();

            let completed = reduced.iter().filter(|r| r.is_some()).count();
            if completed < n {
                debug!("Cancelled after {completed} of {n} peak lists");
                return Err(BatchError::Cancelled { completed });
            }
            Ok(reduced.into_iter().flatten().collect())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::ReductionParams;
    use crate::peaks::Peak;

    fn make_lists() -> Vec<PeakList> {
        (0..4)
            .map(|i| {
                PeakList::new(vec![
                    Peak::new(200.0 + i as f64, 5000.0),
                    Peak::with_charge(500.0 + i as f64, 2000.0, 2),
                ])
            })
            .collect()
    }

    #[test_log::test]
    fn test_reduce_batch() {
        let mut engine =
            ReductionEngine::new(ReductionParams::default(), |_: f64| vec![1.0, 0.5]);
        let reduced = engine.reduce_batch(make_lists(), None).unwrap();
        assert_eq!(reduced.len(), 4);
        for (i, peak_list) in reduced.iter().enumerate() {
            assert_eq!(peak_list.len(), 2);
            assert_eq!(peak_list[0].mz, 200.0 + i as f64);
            assert_eq!(peak_list[1].charge, Some(1));
        }
    }

    #[test]
    fn test_cancelled() {
        let mut engine =
            ReductionEngine::new(ReductionParams::default(), |_: f64| vec![1.0, 0.5]);
        let flag = AtomicBool::new(true);
        let err = engine.reduce_batch(make_lists(), Some(&flag)).unwrap_err();
        assert_eq!(err, BatchError::Cancelled { completed: 0 });

        let flag = AtomicBool::new(false);
        let reduced = engine.reduce_batch(make_lists(), Some(&flag)).unwrap();
        assert_eq!(reduced.len(), 4);
    }

    #[cfg(feature = "parallelism")]
    #[test_log::test]
    fn test_par_reduce_batch() {
        let mut engine = ReductionEngine::new(
            ReductionParams::default(),
            crate::isotopic_model::CachingAbundanceModel::new(
                |_: f64| vec![1.0, 0.5],
                1.0,
            ),
        );
        let serial = engine.reduce_batch(make_lists(), None).unwrap();
        let parallel = engine.par_reduce_batch(make_lists(), None).unwrap();
        assert_eq!(serial, parallel);

        let flag = AtomicBool::new(true);
        let err = engine.par_reduce_batch(make_lists(), Some(&flag)).unwrap_err();
        assert_eq!(err, BatchError::Cancelled { completed: 0 });
    }
}
