//! Normalized feasibility constraints.
//!
//! Every constraint is a value with a `[min, max]` band. A value outside its
//! band is infeasible, which is data for the optimizer and never an error.
//!
//! | Kind | Value | Band |
//! |------|-------|------|
//! | BHP | `(p_wellbore - p_pipe) / p_wellbore`, 0.5 before install | `[0, 1]` |
//! | Capacity | `(max - rate) / max` | `[0, 1]` |
//! | Routing | sum of outgoing routing fractions | `[1, 1]` or `[0, 1]` |
//! | Material balance | superposed rate - rate variable | `[0, 0]` |
//! | Booster capacity | `(capacity - liquid) / capacity` | `[0, 1]` |
//! | User | signed sum of component properties | user supplied |
//!
//! The layout of a [`ConstraintSet`] (count and order) depends only on the
//! topology and variable bounds, so the sets of a baseline and a perturbed
//! evaluation line up entry for entry.

use flowline_core::{
    Diagnostics, FlowError, FlowResult, Network, Node, NodeIndex, Phase, Property,
};
use serde::Serialize;
use tracing::warn;

/// Wellbore pressures below this are floored before normalizing.
pub const WELLBORE_PRESSURE_FLOOR: f64 = 0.001;
/// BHP constraint value for a well that is not installed yet.
pub const UNINSTALLED_BHP_VALUE: f64 = 0.5;
const CAPACITY_FLOOR: f64 = 1e-6;
const ROUTING_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConstraintId(usize);

impl ConstraintId {
    #[inline]
    pub fn new(value: usize) -> Self {
        ConstraintId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Bhp,
    Capacity,
    Routing,
    MaterialBalance,
    BoosterCapacity,
    User,
}

#[derive(Debug, Clone, Serialize)]
pub struct Constraint {
    pub id: ConstraintId,
    pub name: String,
    pub kind: ConstraintKind,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl Constraint {
    /// Distance outside the band, zero when feasible.
    pub fn violation(&self) -> f64 {
        if self.value < self.min {
            self.min - self.value
        } else if self.value > self.max {
            self.value - self.max
        } else {
            0.0
        }
    }

    pub fn is_feasible(&self, tolerance: f64) -> bool {
        self.violation() <= tolerance
    }
}

/// Ordered constraint values of one evaluation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ConstraintSet {
    items: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        kind: ConstraintKind,
        name: impl Into<String>,
        value: f64,
        min: f64,
        max: f64,
    ) -> ConstraintId {
        let id = ConstraintId(self.items.len());
        self.items.push(Constraint {
            id,
            name: name.into(),
            kind,
            value,
            min,
            max,
        });
        id
    }

    pub fn get(&self, id: ConstraintId) -> Option<&Constraint> {
        self.items.get(id.0)
    }

    pub fn by_name(&self, name: &str) -> Option<&Constraint> {
        self.items.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.items.iter()
    }

    pub fn of_kind(&self, kind: ConstraintKind) -> impl Iterator<Item = &Constraint> {
        self.items.iter().filter(move |c| c.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_violation(&self) -> f64 {
        self.items.iter().map(Constraint::violation).sum()
    }

    /// (id, value) pairs in order.
    pub fn values(&self) -> Vec<(ConstraintId, f64)> {
        self.items.iter().map(|c| (c.id, c.value)).collect()
    }
}

/// Routing-weighted average of the inlet pressures of `idx`'s outlets.
///
/// Returns `None` when the outlet fractions sum to zero.
pub(crate) fn weighted_outlet_pressure(
    network: &Network,
    idx: NodeIndex,
    index: usize,
) -> Option<f64> {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (target, routing) in network.outlets(idx) {
        let fraction = network.variables.value(routing);
        let pressure = network
            .node(target)
            .streams()
            .get(index)
            .map_or(0.0, |s| s.pressure);
        weighted += fraction * pressure;
        total += fraction;
    }
    (total.abs() > ROUTING_EPS).then(|| weighted / total)
}

/// BHP, routing, capacity and booster constraints, in that order.
///
/// Returns the production wells in the order their bottom-hole pressures
/// were checked against the network.
pub fn network_constraints(
    network: &Network,
    set: &mut ConstraintSet,
    diag: &mut Diagnostics,
) -> FlowResult<Vec<NodeIndex>> {
    let wells = bhp_constraints(network, set, diag);
    routing_constraints(network, set);
    capacity_constraints(network, set);
    booster_constraints(network, set);
    Ok(wells)
}

fn bhp_constraints(
    network: &Network,
    set: &mut ConstraintSet,
    diag: &mut Diagnostics,
) -> Vec<NodeIndex> {
    let times = network.schedule.len();
    let mut order = Vec::new();
    for well in network.production_wells() {
        if network.outlets(well).is_empty() {
            continue;
        }
        order.push(well);
        let name = network.label(well);
        for t in 0..times {
            let label = format!("bhp:{name}:{t}");
            if !network.is_installed(well, t) {
                set.push(ConstraintKind::Bhp, label, UNINSTALLED_BHP_VALUE, 0.0, 1.0);
                continue;
            }
            let mut wellbore = network.node(well).streams().get(t).map_or(0.0, |s| s.pressure);
            if wellbore < WELLBORE_PRESSURE_FLOOR {
                warn!(well = name, t, wellbore, "wellbore pressure floored");
                diag.add_warning_at("constraint", "Wellbore pressure floored", name, t);
                wellbore = WELLBORE_PRESSURE_FLOOR;
            }
            let pipe = match weighted_outlet_pressure(network, well, t) {
                Some(p) => p,
                None => {
                    warn!(well = name, t, "zero total routing fraction");
                    diag.add_warning_at("pressure", "Zero total routing fraction", name, t);
                    0.0
                }
            };
            set.push(ConstraintKind::Bhp, label, (wellbore - pipe) / wellbore, 0.0, 1.0);
        }
    }
    order
}

fn routing_constraints(network: &Network, set: &mut ConstraintSet) {
    for idx in network.graph.node_indices() {
        let outlets = network.outlets(idx);
        if outlets.len() < 2 {
            continue;
        }
        let free = outlets.iter().any(|(_, routing)| {
            network
                .variables
                .get(*routing)
                .is_some_and(|v| v.is_variable())
        });
        if !free {
            continue;
        }
        let must_route = match network.node(idx) {
            Node::Well(w) => w.must_route,
            _ => true,
        };
        let sum: f64 = outlets
            .iter()
            .map(|(_, routing)| network.variables.value(*routing))
            .sum();
        let min = if must_route { 1.0 } else { 0.0 };
        set.push(
            ConstraintKind::Routing,
            format!("routing:{}", network.label(idx)),
            sum,
            min,
            1.0,
        );
    }
}

fn capacity_constraints(network: &Network, set: &mut ConstraintSet) {
    let times = network.schedule.len();
    for capacity in &network.capacities {
        for (label, max) in capacity.limits() {
            if max <= 0.0 {
                continue;
            }
            let phase = match label {
                "oil" => Some(Phase::Oil),
                "gas" => Some(Phase::Gas),
                "water" => Some(Phase::Water),
                _ => None,
            };
            for t in 0..times {
                let actual: f64 = capacity
                    .feeds
                    .iter()
                    .map(|&feed| network.rate(feed, t, phase))
                    .sum();
                set.push(
                    ConstraintKind::Capacity,
                    format!("capacity:{}:{label}:{t}", capacity.name),
                    (max - actual) / max,
                    0.0,
                    1.0,
                );
            }
        }
    }
}

fn booster_constraints(network: &Network, set: &mut ConstraintSet) {
    let times = network.schedule.len();
    for idx in network.segments() {
        let Node::Booster(booster) = network.node(idx) else {
            continue;
        };
        let Some(var) = network.variables.get(booster.capacity) else {
            continue;
        };
        if var.max <= 0.0 {
            continue;
        }
        let capacity = var.value.max(CAPACITY_FLOOR);
        for t in 0..times {
            let value = if network.is_installed(idx, t) {
                (capacity - network.rate(idx, t, None)) / capacity
            } else {
                1.0
            };
            set.push(
                ConstraintKind::BoosterCapacity,
                format!("booster:{}:{t}", booster.name),
                value,
                0.0,
                1.0,
            );
        }
    }
}

/// Evaluate the user-defined linear constraints.
pub fn user_constraints(network: &Network, set: &mut ConstraintSet) -> FlowResult<()> {
    for uc in &network.user_constraints {
        let mut value = 0.0;
        for term in &uc.terms {
            let idx = network.require(&term.component)?;
            value += term.coefficient * property(network, idx, uc.time_index, term.property)?;
        }
        set.push(ConstraintKind::User, uc.name.clone(), value, uc.min, uc.max);
    }
    Ok(())
}

fn property(network: &Network, idx: NodeIndex, index: usize, property: Property) -> FlowResult<f64> {
    let node = network.node(idx);
    let stream = node.streams().get(index).ok_or_else(|| FlowError::StreamIndex {
        component: node.label().to_string(),
        index,
        len: node.streams().len(),
    })?;
    match property {
        Property::OilRate => Ok(stream.oil_rate),
        Property::GasRate => Ok(stream.gas_rate),
        Property::WaterRate => Ok(stream.water_rate),
        Property::Pressure => Ok(stream.pressure),
        Property::RemovedVolume => match node {
            Node::Separator(sep) => Ok(sep
                .removed
                .get(index)
                .map_or(0.0, |s| s.rate(sep.kind.phase()))),
            other => Err(FlowError::Validation(format!(
                "'{}' is not a separator and has no removed volume",
                other.label()
            ))),
        },
    }
}
