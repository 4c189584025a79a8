//! Run-time configuration.
//!
//! All structs deserialize from any `serde` format and fall back to defaults for missing fields.
use crate::element::Var;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

pub use crate::bicgstab::BicgstabSettings;
pub use crate::convection::TemporalScheme;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSettings {
    pub timestep: f64,
    pub scheme: TemporalScheme,
}

impl Default for TimeSettings {
    fn default() -> Self {
        Self {
            timestep: 1e-2,
            scheme: TemporalScheme::EulerExplicit,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptSettings {
    /// Refinement threshold on the error estimate of `variable`, per unit volume.
    pub refine_error_scalar: f64,
    pub variable: Var,
}

impl Default for AdaptSettings {
    fn default() -> Self {
        Self {
            refine_error_scalar: 0.05,
            variable: Var::S,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub time: TimeSettings,
    pub bicgstab: BicgstabSettings,
    pub adapt: AdaptSettings,
}

impl Settings {
    /// Checks that all parameters are in range. NaN values are rejected.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), SettingsError> {
        use SettingsError::*;
        if !(self.time.timestep > 0.0) {
            return Err(NonPositiveTimestep(self.time.timestep));
        }
        if !(self.bicgstab.epsilon > 0.0) {
            return Err(NonPositiveTolerance(self.bicgstab.epsilon));
        }
        if !(self.bicgstab.small > 0.0) {
            return Err(NonPositiveRegularization(self.bicgstab.small));
        }
        if self.bicgstab.k_min > self.bicgstab.k_max {
            return Err(InvalidIterationBounds {
                k_min: self.bicgstab.k_min,
                k_max: self.bicgstab.k_max,
            });
        }
        if !(self.adapt.refine_error_scalar >= 0.0) {
            return Err(NegativeRefinementError(self.adapt.refine_error_scalar));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    NonPositiveTimestep(f64),
    NonPositiveTolerance(f64),
    NonPositiveRegularization(f64),
    InvalidIterationBounds { k_min: usize, k_max: usize },
    NegativeRefinementError(f64),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveTimestep(dt) => write!(f, "Timestep must be positive, got {}", dt),
            Self::NonPositiveTolerance(eps) => write!(f, "BICGSTAB tolerance must be positive, got {}", eps),
            Self::NonPositiveRegularization(small) => {
                write!(f, "BICGSTAB regularization must be positive, got {}", small)
            }
            Self::InvalidIterationBounds { k_min, k_max } => {
                write!(f, "Minimum iteration count ({}) exceeds maximum ({})", k_min, k_max)
            }
            Self::NegativeRefinementError(err) => {
                write!(f, "Refinement error threshold must be non-negative, got {}", err)
            }
        }
    }
}

impl Error for SettingsError {}
