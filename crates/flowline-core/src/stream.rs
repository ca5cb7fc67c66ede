//! Time-stamped phase-rate records.
//!
//! A [`Stream`] is a plain value. Combining two streams superposes their rates
//! and resets pressure to zero, since pressure is not additive. Scaling only
//! touches rates.

use crate::units::{Phase, UnitSystem};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul};

/// One record of per-phase rates and pressure at a schedule time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Stream {
    /// Schedule time (days)
    pub time: f64,
    pub oil_rate: f64,
    pub gas_rate: f64,
    pub water_rate: f64,
    pub pressure: f64,
    #[serde(default)]
    pub units: UnitSystem,
}

impl Stream {
    pub fn new(time: f64, oil_rate: f64, gas_rate: f64, water_rate: f64, pressure: f64) -> Self {
        Self {
            time,
            oil_rate,
            gas_rate,
            water_rate,
            pressure,
            units: UnitSystem::Metric,
        }
    }

    /// Zero-valued stream at `time`.
    pub fn empty(time: f64, units: UnitSystem) -> Self {
        Self {
            time,
            units,
            ..Self::default()
        }
    }

    pub fn with_units(mut self, units: UnitSystem) -> Self {
        self.units = units;
        self
    }

    /// Same timestamp and units, all rates and pressure zeroed.
    pub fn zeroed(&self) -> Self {
        Self::empty(self.time, self.units)
    }

    #[inline]
    pub fn rate(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Oil => self.oil_rate,
            Phase::Gas => self.gas_rate,
            Phase::Water => self.water_rate,
        }
    }

    #[inline]
    pub fn set_rate(&mut self, phase: Phase, value: f64) {
        match phase {
            Phase::Oil => self.oil_rate = value,
            Phase::Gas => self.gas_rate = value,
            Phase::Water => self.water_rate = value,
        }
    }

    /// Oil plus water.
    #[inline]
    pub fn liquid_rate(&self) -> f64 {
        self.oil_rate + self.water_rate
    }

    /// Superpose `other` onto `self`.
    ///
    /// `other` is brought into `self`'s unit system first. The result takes
    /// `other`'s timestamp and a pressure of zero.
    pub fn combine(&self, other: &Stream) -> Stream {
        let other = other.convert(self.units);
        Stream {
            time: other.time,
            oil_rate: self.oil_rate + other.oil_rate,
            gas_rate: self.gas_rate + other.gas_rate,
            water_rate: self.water_rate + other.water_rate,
            pressure: 0.0,
            units: self.units,
        }
    }

    /// Multiply all rates by `factor`, leaving pressure and time unchanged.
    pub fn scale(&self, factor: f64) -> Stream {
        Stream {
            oil_rate: self.oil_rate * factor,
            gas_rate: self.gas_rate * factor,
            water_rate: self.water_rate * factor,
            ..*self
        }
    }

    /// Restate this stream in `target` units.
    pub fn convert(&self, target: UnitSystem) -> Stream {
        if self.units == target {
            return *self;
        }
        let from = self.units;
        Stream {
            time: self.time,
            oil_rate: from.convert_rate(Phase::Oil, self.oil_rate, target),
            gas_rate: from.convert_rate(Phase::Gas, self.gas_rate, target),
            water_rate: from.convert_rate(Phase::Water, self.water_rate, target),
            pressure: from.convert_pressure(self.pressure, target),
            units: target,
        }
    }
}

impl Add for Stream {
    type Output = Stream;
    fn add(self, rhs: Stream) -> Stream {
        self.combine(&rhs)
    }
}

impl AddAssign<&Stream> for Stream {
    fn add_assign(&mut self, rhs: &Stream) {
        *self = self.combine(rhs);
    }
}

impl Mul<f64> for Stream {
    type Output = Stream;
    fn mul(self, rhs: f64) -> Stream {
        self.scale(rhs)
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "t={:.2} oil={:.3} gas={:.3} water={:.3} p={:.3} {}",
            self.time,
            self.oil_rate,
            self.gas_rate,
            self.water_rate,
            self.pressure,
            self.units.pressure_unit()
        )
    }
}
