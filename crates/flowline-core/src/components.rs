//! Network components: wells, pipes, separators and pressure boosters.
//!
//! Every component owns one [`Stream`] per schedule entry. Pipes, separators
//! and boosters store the superposed inflow of the current evaluation in those
//! streams, with the pressure field holding the component's inlet pressure once
//! the pressure solve has run. Well streams are inputs from the reservoir side.

use crate::error::{FlowError, FlowResult};
use crate::pressure_drop::PressureDrop;
use crate::stream::Stream;
use crate::units::{Phase, UnitSystem};
use crate::variables::VarId;
use serde::{Deserialize, Serialize};

/// Capital cost of installing a component.
///
/// `amount = constant + capacity_factor * capacity^exponent`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstallCost {
    #[serde(default)]
    pub constant: f64,
    #[serde(default)]
    pub capacity_factor: f64,
    #[serde(default = "default_exponent")]
    pub exponent: f64,
}

fn default_exponent() -> f64 {
    1.0
}

impl InstallCost {
    pub fn amount(&self, capacity: f64) -> f64 {
        self.constant + self.capacity_factor * capacity.max(0.0).powf(self.exponent)
    }
}

/// A cost incurred at a schedule time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEvent {
    pub time: f64,
    pub amount: f64,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WellKind {
    Production,
    Injection,
}

/// What a well control variable sets on the reservoir side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Bhp,
    OilRate,
    GasRate,
    WaterRate,
    LiquidRate,
}

/// Per-period control set point of a well.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WellControl {
    pub time_index: usize,
    pub mode: ControlMode,
    pub variable: VarId,
}

#[derive(Debug, Clone)]
pub struct Well {
    pub name: String,
    pub kind: WellKind,
    pub streams: Vec<Stream>,
    pub controls: Vec<WellControl>,
    pub install_time: Option<VarId>,
    pub cost: Option<InstallCost>,
    /// Whether the routing fractions must sum to exactly one
    pub must_route: bool,
}

impl Well {
    pub fn production(name: impl Into<String>) -> Self {
        Self::new(name, WellKind::Production)
    }

    pub fn injection(name: impl Into<String>) -> Self {
        Self::new(name, WellKind::Injection)
    }

    fn new(name: impl Into<String>, kind: WellKind) -> Self {
        Self {
            name: name.into(),
            kind,
            streams: Vec::new(),
            controls: Vec::new(),
            install_time: None,
            cost: None,
            must_route: true,
        }
    }

    pub fn with_install_time(mut self, var: VarId) -> Self {
        self.install_time = Some(var);
        self
    }

    pub fn with_cost(mut self, cost: InstallCost) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_control(mut self, control: WellControl) -> Self {
        self.controls.push(control);
        self
    }

    pub fn is_production(&self) -> bool {
        self.kind == WellKind::Production
    }
}

/// Terminal pipe discharging at a fixed outlet pressure.
#[derive(Debug, Clone)]
pub struct EndPipe {
    pub name: String,
    pub streams: Vec<Stream>,
    pub outlet_pressure: f64,
    /// Units `outlet_pressure` is stated in
    pub outlet_units: UnitSystem,
    pub pressure_drop: PressureDrop,
}

impl EndPipe {
    pub fn new(name: impl Into<String>, outlet_pressure: f64, outlet_units: UnitSystem) -> Self {
        Self {
            name: name.into(),
            streams: Vec::new(),
            outlet_pressure,
            outlet_units,
            pressure_drop: PressureDrop::None,
        }
    }

    pub fn with_pressure_drop(mut self, drop: PressureDrop) -> Self {
        self.pressure_drop = drop;
        self
    }

    /// Outlet boundary pressure restated in `units`.
    pub fn outlet_pressure_in(&self, units: UnitSystem) -> f64 {
        self.outlet_units.convert_pressure(self.outlet_pressure, units)
    }
}

/// Branching pipe feeding one or more downstream components.
#[derive(Debug, Clone)]
pub struct MidPipe {
    pub name: String,
    pub streams: Vec<Stream>,
    pub pressure_drop: PressureDrop,
}

impl MidPipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            streams: Vec::new(),
            pressure_drop: PressureDrop::None,
        }
    }

    pub fn with_pressure_drop(mut self, drop: PressureDrop) -> Self {
        self.pressure_drop = drop;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeparatorKind {
    Water,
    Gas,
}

impl SeparatorKind {
    pub fn phase(self) -> Phase {
        match self {
            SeparatorKind::Water => Phase::Water,
            SeparatorKind::Gas => Phase::Gas,
        }
    }
}

/// Removes a fraction of one phase, limited by a per-period capacity.
#[derive(Debug, Clone)]
pub struct Separator {
    pub name: String,
    pub streams: Vec<Stream>,
    pub kind: SeparatorKind,
    pub install_time: Option<VarId>,
    pub remove_fraction: VarId,
    pub remove_capacity: VarId,
    pub cost: Option<InstallCost>,
    /// Capacity left in each period of the current evaluation
    pub remaining: Vec<f64>,
    /// Volume taken out in each period of the current evaluation
    pub removed: Vec<Stream>,
}

impl Separator {
    pub fn new(
        name: impl Into<String>,
        kind: SeparatorKind,
        remove_fraction: VarId,
        remove_capacity: VarId,
    ) -> Self {
        Self {
            name: name.into(),
            streams: Vec::new(),
            kind,
            install_time: None,
            remove_fraction,
            remove_capacity,
            cost: None,
            remaining: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn with_install_time(mut self, var: VarId) -> Self {
        self.install_time = Some(var);
        self
    }

    pub fn with_cost(mut self, cost: InstallCost) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Restore the full removal capacity in every period.
    pub fn reset_removal(&mut self, capacity: f64) {
        let capacity = capacity.max(0.0);
        for r in &mut self.remaining {
            *r = capacity;
        }
        for s in &mut self.removed {
            *s = s.zeroed();
        }
    }

    /// Take the separated phase out of `stream` at period `index`.
    ///
    /// Removes `fraction` of the phase rate, but never more than the capacity
    /// still left in the period. Returns the stream passed on downstream.
    pub fn separate(
        &mut self,
        index: usize,
        stream: &Stream,
        fraction: f64,
        installed: bool,
    ) -> FlowResult<Stream> {
        if index >= self.remaining.len() {
            return Err(FlowError::StreamIndex {
                component: self.name.clone(),
                index,
                len: self.remaining.len(),
            });
        }
        if !installed {
            return Ok(*stream);
        }
        let phase = self.kind.phase();
        let wanted = (stream.rate(phase) * fraction.clamp(0.0, 1.0)).max(0.0);
        let taken = wanted.min(self.remaining[index]);
        self.remaining[index] -= taken;

        let removed = &mut self.removed[index];
        let removed_units = removed.units;
        let mut taken_stream = stream.zeroed();
        taken_stream.set_rate(phase, taken);
        removed.set_rate(
            phase,
            removed.rate(phase) + taken_stream.convert(removed_units).rate(phase),
        );

        let mut out = *stream;
        out.set_rate(phase, stream.rate(phase) - taken);
        Ok(out)
    }
}

/// Boosts pressure by a fixed increase once installed.
#[derive(Debug, Clone)]
pub struct PressureBooster {
    pub name: String,
    pub streams: Vec<Stream>,
    pub install_time: Option<VarId>,
    pub pressure_increase: VarId,
    /// Maximum liquid rate the booster handles
    pub capacity: VarId,
    pub cost: Option<InstallCost>,
}

impl PressureBooster {
    pub fn new(name: impl Into<String>, pressure_increase: VarId, capacity: VarId) -> Self {
        Self {
            name: name.into(),
            streams: Vec::new(),
            install_time: None,
            pressure_increase,
            capacity,
            cost: None,
        }
    }

    pub fn with_install_time(mut self, var: VarId) -> Self {
        self.install_time = Some(var);
        self
    }

    pub fn with_cost(mut self, cost: InstallCost) -> Self {
        self.cost = Some(cost);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableSet;

    fn water_separator() -> Separator {
        let mut vars = VariableSet::new();
        let fraction = vars.add_fixed("frac", 0.5);
        let capacity = vars.add_fixed("cap", 30.0);
        let mut sep = Separator::new("sep", SeparatorKind::Water, fraction, capacity);
        sep.remaining = vec![0.0; 2];
        sep.removed = vec![Stream::default(); 2];
        sep.reset_removal(30.0);
        sep
    }

    #[test]
    fn test_separator_capacity_depletes_within_period() {
        let mut sep = water_separator();
        let s = Stream::new(0.0, 100.0, 0.0, 40.0, 0.0);

        let first = sep.separate(0, &s, 0.5, true).unwrap();
        assert_eq!(first.water_rate, 20.0);
        let second = sep.separate(0, &s, 0.5, true).unwrap();
        assert_eq!(second.water_rate, 30.0);
        assert_eq!(sep.removed[0].water_rate, 30.0);
        assert_eq!(sep.remaining[0], 0.0);
        // other period untouched
        assert_eq!(sep.remaining[1], 30.0);

        sep.reset_removal(30.0);
        assert_eq!(sep.remaining[0], 30.0);
        assert_eq!(sep.removed[0].water_rate, 0.0);
    }

    #[test]
    fn test_separator_not_installed_passes_through() {
        let mut sep = water_separator();
        let s = Stream::new(0.0, 100.0, 0.0, 40.0, 0.0);
        let out = sep.separate(1, &s, 0.5, false).unwrap();
        assert_eq!(out, s);
    }

    #[test]
    fn test_separator_index_out_of_range() {
        let mut sep = water_separator();
        let s = Stream::default();
        assert!(matches!(
            sep.separate(5, &s, 0.5, true),
            Err(FlowError::StreamIndex { index: 5, .. })
        ));
    }

    #[test]
    fn test_install_cost() {
        let cost = InstallCost {
            constant: 10.0,
            capacity_factor: 2.0,
            exponent: 1.0,
        };
        assert_eq!(cost.amount(5.0), 20.0);
    }

    #[test]
    fn test_end_pipe_outlet_conversion() {
        let pipe = EndPipe::new("export", 50.0, UnitSystem::Field);
        let bar = pipe.outlet_pressure_in(UnitSystem::Metric);
        assert!((bar - 50.0 / crate::units::PSI_PER_BAR).abs() < 1e-12);
    }
}
