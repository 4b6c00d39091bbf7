//! Parameters for the charge assignment and reduction engines, and their validation.
//!
//! With the `config` feature, [`ReductionParams`] can also be layered from TOML files and
//! `MZREDUCE_`-prefixed environment variables using [`figment`](https://docs.rs/figment).
use std::fmt::Display;

use thiserror::Error;

use crate::matcher::PeakMatcher;

/// Which peak receives the charge found for an isotope pair
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum AssignmentTarget {
    /// The peak the matcher found at the expected isotope position
    #[default]
    MatchedPeak,
    /// The peak immediately after the monoisotopic peak in m/z order, whether or not it was
    /// the matched peak
    AdjacentPeak,
}

impl Display for AssignmentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Invalid values for an engine's parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("{name} must be a finite, non-negative number, got {value}")]
    InvalidTolerance { name: &'static str, value: f64 },
    #[error("The maximum charge state must be at least 1")]
    InvalidMaxCharge,
    #[error("The allowed isotope deviation must be a finite, non-negative number, got {0}")]
    InvalidDeviation(f64),
    #[error("The intensity threshold must be a finite, non-negative number, got {0}")]
    InvalidThreshold(f64),
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParameterError::InvalidTolerance { name, value })
    }
}

fn check_common(
    ppm_tolerance: f64,
    min_tolerance: f64,
    max_charge_state: u32,
    allowed_isotope_deviation: f64,
) -> Result<(), ParameterError> {
    check_non_negative("ppm_tolerance", ppm_tolerance)?;
    check_non_negative("min_tolerance", min_tolerance)?;
    if max_charge_state == 0 {
        return Err(ParameterError::InvalidMaxCharge);
    }
    if !(allowed_isotope_deviation.is_finite() && allowed_isotope_deviation >= 0.0) {
        return Err(ParameterError::InvalidDeviation(allowed_isotope_deviation));
    }
    Ok(())
}

/// Parameters for [`ChargeAssignmentEngine`](crate::charge::ChargeAssignmentEngine)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChargeAssignmentParams {
    /// The highest charge state to try
    pub max_charge_state: u32,
    /// The largest accepted relative difference between the predicted and observed
    /// intensity of the next isotope peak
    pub allowed_isotope_deviation: f64,
    pub ppm_tolerance: f64,
    /// The absolute floor of the matching tolerance, in Daltons
    pub min_tolerance: f64,
    pub assignment_target: AssignmentTarget,
}

impl Default for ChargeAssignmentParams {
    fn default() -> Self {
        Self {
            max_charge_state: 4,
            allowed_isotope_deviation: 0.2,
            ppm_tolerance: 10.0,
            min_tolerance: 0.05,
            assignment_target: AssignmentTarget::MatchedPeak,
        }
    }
}

impl ChargeAssignmentParams {
    pub fn new(
        max_charge_state: u32,
        allowed_isotope_deviation: f64,
        ppm_tolerance: f64,
        min_tolerance: f64,
    ) -> Self {
        Self {
            max_charge_state,
            allowed_isotope_deviation,
            ppm_tolerance,
            min_tolerance,
            assignment_target: AssignmentTarget::default(),
        }
    }

    pub fn with_max_charge_state(mut self, max_charge_state: u32) -> Self {
        self.max_charge_state = max_charge_state;
        self
    }

    pub fn with_allowed_isotope_deviation(mut self, allowed_isotope_deviation: f64) -> Self {
        self.allowed_isotope_deviation = allowed_isotope_deviation;
        self
    }

    pub fn with_ppm_tolerance(mut self, ppm_tolerance: f64) -> Self {
        self.ppm_tolerance = ppm_tolerance;
        self
    }

    pub fn with_min_tolerance(mut self, min_tolerance: f64) -> Self {
        self.min_tolerance = min_tolerance;
        self
    }

    pub fn with_assignment_target(mut self, assignment_target: AssignmentTarget) -> Self {
        self.assignment_target = assignment_target;
        self
    }

    pub fn matcher(&self) -> PeakMatcher {
        PeakMatcher::new(self.ppm_tolerance, self.min_tolerance)
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        check_common(
            self.ppm_tolerance,
            self.min_tolerance,
            self.max_charge_state,
            self.allowed_isotope_deviation,
        )
    }
}

/// Parameters for [`ReductionEngine`](crate::reduction::ReductionEngine).
///
/// The tolerances, maximum charge, isotope deviation and assignment target are forwarded
/// to the charge assignment step the reduction engine runs first.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReductionParams {
    pub ppm_tolerance: f64,
    pub min_tolerance: f64,
    pub max_charge_state: u32,
    /// Original peaks must be strictly more intense than this to be kept
    pub intensity_threshold: f64,
    pub allowed_isotope_deviation: f64,
    pub assignment_target: AssignmentTarget,
    /// Floor intensities at zero when isotope depletion would drive them negative
    pub clamp_depleted_intensity: bool,
}

impl Default for ReductionParams {
    fn default() -> Self {
        Self {
            ppm_tolerance: 10.0,
            min_tolerance: 0.02,
            max_charge_state: 5,
            intensity_threshold: 1000.0,
            allowed_isotope_deviation: 0.2,
            assignment_target: AssignmentTarget::MatchedPeak,
            clamp_depleted_intensity: false,
        }
    }
}

impl ReductionParams {
    pub fn new(
        ppm_tolerance: f64,
        min_tolerance: f64,
        max_charge_state: u32,
        intensity_threshold: f64,
    ) -> Self {
        Self {
            ppm_tolerance,
            min_tolerance,
            max_charge_state,
            intensity_threshold,
            ..Default::default()
        }
    }

    pub fn with_ppm_tolerance(mut self, ppm_tolerance: f64) -> Self {
        self.ppm_tolerance = ppm_tolerance;
        self
    }

    pub fn with_min_tolerance(mut self, min_tolerance: f64) -> Self {
        self.min_tolerance = min_tolerance;
        self
    }

    pub fn with_max_charge_state(mut self, max_charge_state: u32) -> Self {
        self.max_charge_state = max_charge_state;
        self
    }

    pub fn with_intensity_threshold(mut self, intensity_threshold: f64) -> Self {
        self.intensity_threshold = intensity_threshold;
        self
    }

    pub fn with_allowed_isotope_deviation(mut self, allowed_isotope_deviation: f64) -> Self {
        self.allowed_isotope_deviation = allowed_isotope_deviation;
        self
    }

    pub fn with_assignment_target(mut self, assignment_target: AssignmentTarget) -> Self {
        self.assignment_target = assignment_target;
        self
    }

    pub fn with_clamp_depleted_intensity(mut self, clamp_depleted_intensity: bool) -> Self {
        self.clamp_depleted_intensity = clamp_depleted_intensity;
        self
    }

    pub fn matcher(&self) -> PeakMatcher {
        PeakMatcher::new(self.ppm_tolerance, self.min_tolerance)
    }

    /// The parameters of the charge assignment step
    pub fn charge_assignment_params(&self) -> ChargeAssignmentParams {
        ChargeAssignmentParams {
            max_charge_state: self.max_charge_state,
            allowed_isotope_deviation: self.allowed_isotope_deviation,
            ppm_tolerance: self.ppm_tolerance,
            min_tolerance: self.min_tolerance,
            assignment_target: self.assignment_target,
        }
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        check_common(
            self.ppm_tolerance,
            self.min_tolerance,
            self.max_charge_state,
            self.allowed_isotope_deviation,
        )?;
        if !(self.intensity_threshold.is_finite() && self.intensity_threshold >= 0.0) {
            return Err(ParameterError::InvalidThreshold(self.intensity_threshold));
        }
        Ok(())
    }
}

#[cfg(feature = "config")]
mod config {
    use std::path::Path;

    use figment::{
        providers::{Env, Format, Serialized, Toml},
        Figment,
    };
    use thiserror::Error;

    use super::{ParameterError, ReductionParams};

    /// The file read from the working directory when loading configuration
    pub const DEFAULT_CONFIG_FILE: &str = "mzreduce.toml";

    /// The prefix of environment variables that override configuration values
    pub const ENV_PREFIX: &str = "MZREDUCE_";

    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("Failed to read configuration: {0}")]
        Figment(#[from] Box<figment::Error>),
        #[error("Invalid configuration: {0}")]
        InvalidParameters(#[from] ParameterError),
    }

    impl From<figment::Error> for ConfigError {
        fn from(value: figment::Error) -> Self {
            Self::Figment(Box::new(value))
        }
    }

    impl ReductionParams {
        /// Build the configuration layers: defaults, then [`DEFAULT_CONFIG_FILE`] if it
        /// exists, then `path` if given, then [`ENV_PREFIX`] environment variables.
        pub fn figment(path: Option<&Path>) -> Figment {
            let mut figment = Figment::from(Serialized::defaults(ReductionParams::default()))
                .merge(Toml::file(DEFAULT_CONFIG_FILE));
            if let Some(path) = path {
                figment = figment.merge(Toml::file_exact(path));
            }
            figment.merge(Env::prefixed(ENV_PREFIX))
        }

        /// Extract and validate parameters from an arbitrary configuration source
        pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
            let params: Self = figment.extract()?;
            params.validate()?;
            Ok(params)
        }

        /// Load parameters from the standard configuration layers
        pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
            let figment = Self::figment(path);
            let params = Self::from_figment(&figment)?;
            tracing::debug!("Loaded reduction parameters {params:?}");
            Ok(params)
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;
        use crate::params::AssignmentTarget;

        #[test]
        fn test_from_toml() {
            let figment = Figment::from(Serialized::defaults(ReductionParams::default())).merge(
                Toml::string(
                    r#"
                    ppm_tolerance = 20.0
                    intensity_threshold = 50.0
                    assignment_target = "adjacent-peak"
                    "#,
                ),
            );
            let params = ReductionParams::from_figment(&figment).unwrap();
            assert_eq!(params.ppm_tolerance, 20.0);
            assert_eq!(params.intensity_threshold, 50.0);
            assert_eq!(params.assignment_target, AssignmentTarget::AdjacentPeak);
            assert_eq!(params.max_charge_state, 5);
            assert_eq!(params.min_tolerance, 0.02);
        }

        #[test]
        fn test_partial_toml_without_defaults() {
            let figment = Figment::from(Toml::string("max_charge_state = 3"));
            let params = ReductionParams::from_figment(&figment).unwrap();
            assert_eq!(params.max_charge_state, 3);
            assert_eq!(params.intensity_threshold, 1000.0);
        }

        #[test]
        fn test_invalid_toml_values() {
            let figment = Figment::from(Toml::string("max_charge_state = 0"));
            let err = ReductionParams::from_figment(&figment).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidParameters(ParameterError::InvalidMaxCharge)
            ));

            let figment = Figment::from(Toml::string("ppm_tolerance = \"wide\""));
            let err = ReductionParams::from_figment(&figment).unwrap_err();
            assert!(matches!(err, ConfigError::Figment(_)));
        }

        #[test]
        fn test_env_override() {
            figment::Jail::expect_with(|jail| {
                jail.create_file(DEFAULT_CONFIG_FILE, "intensity_threshold = 10.0")?;
                jail.set_env("MZREDUCE_MAX_CHARGE_STATE", "7");
                let params = ReductionParams::load(None).unwrap();
                assert_eq!(params.intensity_threshold, 10.0);
                assert_eq!(params.max_charge_state, 7);
                Ok(())
            });
        }
    }
}

#[cfg(feature = "config")]
pub use config::{ConfigError, DEFAULT_CONFIG_FILE, ENV_PREFIX};
