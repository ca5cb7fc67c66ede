//! Unit systems and typed pressure quantities for surface network streams.
//!
//! Two unit systems are supported:
//!
//! | System | Oil / water | Gas | Pressure |
//! |--------|-------------|-----|----------|
//! | [`UnitSystem::Metric`] | Sm3/d | Sm3/d | bara |
//! | [`UnitSystem::Field`] | stb/d | Mscf/d | psia |
//!
//! Rates convert by a fixed factor per phase and direction, pressure by its
//! own fixed factor. Converting there and back reproduces the original value
//! within floating point tolerance.
//!
//! # Usage
//!
//! ```
//! use flowline_core::units::{Bara, Phase, UnitSystem};
//!
//! let oil_field = UnitSystem::Metric.convert_rate(Phase::Oil, 100.0, UnitSystem::Field);
//! assert!((oil_field - 628.9811).abs() < 1e-3);
//!
//! let p = Bara(50.0).to_psia();
//! assert!((p.to_bara().value() - 50.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Stock-tank barrels per standard cubic metre.
pub const STB_PER_SM3: f64 = 6.289_811;
/// Thousand standard cubic feet per standard cubic metre.
pub const MSCF_PER_SM3: f64 = 0.035_314_7;
/// Pounds per square inch per bar.
pub const PSI_PER_BAR: f64 = 14.503_773_8;

/// Macro to implement common arithmetic operations for unit types
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Maximum of two values
            #[inline]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }
        }
    };
}

/// Absolute pressure in bar (METRIC).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Bara(pub f64);

impl_unit_ops!(Bara, "bara");

/// Absolute pressure in pounds per square inch (FIELD).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Psia(pub f64);

impl_unit_ops!(Psia, "psia");

impl Bara {
    #[inline]
    pub fn to_psia(self) -> Psia {
        Psia(self.0 * PSI_PER_BAR)
    }
}

impl Psia {
    #[inline]
    pub fn to_bara(self) -> Bara {
        Bara(self.0 / PSI_PER_BAR)
    }
}

/// Fluid phase carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Oil,
    Gas,
    Water,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Oil, Phase::Gas, Phase::Water];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Oil => "oil",
            Phase::Gas => "gas",
            Phase::Water => "water",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit system a stream's rates and pressure are stated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Field,
}

impl UnitSystem {
    /// Multiplier turning a rate of `phase` stated in `self` into `target` units.
    pub fn rate_factor(self, phase: Phase, target: UnitSystem) -> f64 {
        let to_field = match phase {
            Phase::Oil | Phase::Water => STB_PER_SM3,
            Phase::Gas => MSCF_PER_SM3,
        };
        match (self, target) {
            (UnitSystem::Metric, UnitSystem::Field) => to_field,
            (UnitSystem::Field, UnitSystem::Metric) => 1.0 / to_field,
            _ => 1.0,
        }
    }

    /// Convert a rate of `phase` from `self` into `target` units.
    #[inline]
    pub fn convert_rate(self, phase: Phase, value: f64, target: UnitSystem) -> f64 {
        value * self.rate_factor(phase, target)
    }

    /// Convert an absolute pressure from `self` into `target` units.
    pub fn convert_pressure(self, value: f64, target: UnitSystem) -> f64 {
        match (self, target) {
            (UnitSystem::Metric, UnitSystem::Field) => Bara(value).to_psia().value(),
            (UnitSystem::Field, UnitSystem::Metric) => Psia(value).to_bara().value(),
            _ => value,
        }
    }

    pub fn pressure_unit(self) -> &'static str {
        match self {
            UnitSystem::Metric => "bara",
            UnitSystem::Field => "psia",
        }
    }
}
