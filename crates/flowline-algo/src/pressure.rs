//! Inlet-pressure solve.
//!
//! Pressures run against the flow: the terminal pipes hold the boundary
//! condition and every other segment derives its inlet pressure from the
//! components it discharges into. Nodes are visited in reverse topological
//! order so each outlet pressure exists before it is read.

use crate::constraints::weighted_outlet_pressure;
use flowline_core::graph_utils::downstream_first;
use flowline_core::{Diagnostics, FlowError, FlowResult, Network, Node, NodeIndex};
use tracing::{debug, warn};

/// Booster discharge pressures below this are floored.
pub const PRESSURE_FLOOR: f64 = 0.001;

/// Compute the inlet pressure of every pipe, separator and booster.
///
/// Returns the segments in the order their pressures were computed.
pub fn solve_pressures(
    network: &mut Network,
    diag: &mut Diagnostics,
) -> FlowResult<Vec<NodeIndex>> {
    let order = downstream_first(network)?;
    let times = network.schedule.len();
    let mut solved = Vec::with_capacity(order.len());

    for idx in order {
        if network.node(idx).is_well() {
            continue;
        }
        for t in 0..times {
            let pressure = inlet_pressure(network, idx, t, diag)?;
            if let Some(stream) = network.node_mut(idx).streams_mut().get_mut(t) {
                stream.pressure = pressure;
            }
        }
        debug!(component = network.label(idx), "inlet pressure solved");
        solved.push(idx);
    }
    Ok(solved)
}

fn inlet_pressure(
    network: &Network,
    idx: NodeIndex,
    t: usize,
    diag: &mut Diagnostics,
) -> FlowResult<f64> {
    let node = network.node(idx);
    let stream = node.streams().get(t).copied().unwrap_or_default();
    match node {
        Node::EndPipe(pipe) => {
            let outlet = pipe.outlet_pressure_in(stream.units);
            Ok(pipe.pressure_drop.inlet_pressure(&stream, outlet))
        }
        Node::MidPipe(pipe) => {
            if network.outlets(idx).is_empty() {
                return Err(FlowError::MissingOutlet(pipe.name.clone()));
            }
            let outlet = match weighted_outlet_pressure(network, idx, t) {
                Some(p) => p,
                None => {
                    warn!(pipe = %pipe.name, t, "zero total routing fraction, outlet pressure set to 0");
                    diag.add_warning_at("pressure", "Zero total routing fraction", &pipe.name, t);
                    0.0
                }
            };
            Ok(pipe.pressure_drop.inlet_pressure(&stream, outlet))
        }
        Node::Separator(_) => Ok(outlet_pressure(network, idx, t)?),
        Node::Booster(booster) => {
            let outlet = outlet_pressure(network, idx, t)?;
            if !network.is_installed(idx, t) {
                return Ok(outlet);
            }
            let boosted = outlet - network.variables.value(booster.pressure_increase);
            if boosted <= 0.0 {
                warn!(booster = %booster.name, t, boosted, "booster inlet pressure floored");
                diag.add_warning_at("pressure", "Booster inlet pressure floored", &booster.name, t);
                return Ok(PRESSURE_FLOOR);
            }
            Ok(boosted)
        }
        Node::Well(_) => Err(FlowError::Validation(format!(
            "'{}' is a well and has no inlet pressure",
            node.label()
        ))),
    }
}

/// Inlet pressure of the single component `idx` discharges into.
fn outlet_pressure(network: &Network, idx: NodeIndex, t: usize) -> FlowResult<f64> {
    let (target, _) = network.single_outlet(idx)?;
    Ok(network
        .node(target)
        .streams()
        .get(t)
        .map_or(0.0, |s| s.pressure))
}
