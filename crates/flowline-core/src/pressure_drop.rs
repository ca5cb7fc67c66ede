//! Pipe pressure-drop calculators.
//!
//! Every calculator maps (stream through the pipe, outlet pressure) to the
//! pipe's inlet pressure. Values are interpreted in the stream's own unit
//! system.

use crate::stream::Stream;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PressureDrop {
    /// Inlet equals outlet
    #[default]
    None,
    /// Fixed drop independent of flow
    Constant { drop: f64 },
    /// `dp = a * q_liquid^2 + b * q_gas^2`
    Quadratic {
        liquid_coefficient: f64,
        #[serde(default)]
        gas_coefficient: f64,
    },
    /// Inlet pressure tabulated over liquid rate (rows) and outlet pressure (columns)
    Table(PressureTable),
}

impl PressureDrop {
    /// Inlet pressure for `stream` discharging at `outlet_pressure`.
    pub fn inlet_pressure(&self, stream: &Stream, outlet_pressure: f64) -> f64 {
        match self {
            PressureDrop::None => outlet_pressure,
            PressureDrop::Constant { drop } => outlet_pressure + drop,
            PressureDrop::Quadratic {
                liquid_coefficient,
                gas_coefficient,
            } => {
                let ql = stream.liquid_rate();
                let qg = stream.gas_rate;
                outlet_pressure + liquid_coefficient * ql * ql + gas_coefficient * qg * qg
            }
            PressureDrop::Table(table) => table.lookup(stream.liquid_rate(), outlet_pressure),
        }
    }
}

/// Bilinear table of inlet pressures.
///
/// `inlet_pressures[i][j]` is the inlet pressure at `rates[i]` and
/// `outlet_pressures[j]`. Queries outside the grid are clamped to its edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureTable {
    pub rates: Vec<f64>,
    pub outlet_pressures: Vec<f64>,
    pub inlet_pressures: Vec<Vec<f64>>,
}

impl PressureTable {
    /// Shape and ordering check; returns a message describing the first problem.
    pub fn check(&self) -> Result<(), String> {
        if self.rates.is_empty() || self.outlet_pressures.is_empty() {
            return Err("pressure table needs at least one rate and one outlet pressure".into());
        }
        if self.inlet_pressures.len() != self.rates.len()
            || self
                .inlet_pressures
                .iter()
                .any(|row| row.len() != self.outlet_pressures.len())
        {
            return Err(format!(
                "pressure table must be {}x{}",
                self.rates.len(),
                self.outlet_pressures.len()
            ));
        }
        let increasing = |v: &[f64]| v.windows(2).all(|w| w[0] < w[1]);
        if !increasing(&self.rates) || !increasing(&self.outlet_pressures) {
            return Err("pressure table axes must be strictly increasing".into());
        }
        Ok(())
    }

    pub fn lookup(&self, rate: f64, outlet_pressure: f64) -> f64 {
        if self.check().is_err() {
            return outlet_pressure;
        }
        let (i0, i1, u) = bracket(&self.rates, rate);
        let (j0, j1, v) = bracket(&self.outlet_pressures, outlet_pressure);
        let p = &self.inlet_pressures;
        let low = p[i0][j0] + v * (p[i0][j1] - p[i0][j0]);
        let high = p[i1][j0] + v * (p[i1][j1] - p[i1][j0]);
        low + u * (high - low)
    }
}

/// Indices enclosing `x` and the interpolation weight between them.
fn bracket(axis: &[f64], x: f64) -> (usize, usize, f64) {
    let last = axis.len() - 1;
    if last == 0 || x <= axis[0] {
        return (0, 0, 0.0);
    }
    if x >= axis[last] {
        return (last, last, 0.0);
    }
    for i in 0..last {
        if x >= axis[i] && x <= axis[i + 1] {
            return (i, i + 1, (x - axis[i]) / (axis[i + 1] - axis[i]));
        }
    }
    (last, last, 0.0)
}
