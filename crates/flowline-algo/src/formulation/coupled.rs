//! Direct superposition: mass balance holds by construction.

use super::Formulation;
use flowline_core::graph_utils::topological_order;
use flowline_core::{Diagnostics, FlowError, FlowResult, Network, Node, NodeIndex, Stream};
use tracing::debug;

/// Pushes each production well's stream through the routing tree, scaled by
/// the product of the routing fractions along the way.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoupledModel;

impl Formulation for CoupledModel {
    fn id(&self) -> &str {
        "coupled"
    }

    fn propagate(&self, network: &mut Network, _diag: &mut Diagnostics) -> FlowResult<()> {
        network.check_schedule()?;
        // routing recursion below assumes an acyclic graph
        topological_order(network)?;

        let wells: Vec<NodeIndex> = network.production_wells().collect();
        for well in wells {
            let outlets = network.outlets(well);
            for t in 0..network.schedule.len() {
                if !network.is_installed(well, t) {
                    continue;
                }
                let stream = network.node(well).streams()[t];
                for &(target, routing) in &outlets {
                    let fraction = network.variables.value(routing);
                    route_stream(network, target, t, &stream.scale(fraction))?;
                }
            }
            debug!(well = network.label(well), "well propagated");
        }
        Ok(())
    }
}

/// Add `stream` into `idx` at slot `t` and continue downstream.
pub(crate) fn route_stream(
    network: &mut Network,
    idx: NodeIndex,
    t: usize,
    stream: &Stream,
) -> FlowResult<()> {
    let installed = network.is_installed(idx, t);
    let removal_fraction = match network.node(idx) {
        Node::Separator(sep) => network.variables.value(sep.remove_fraction),
        _ => 0.0,
    };

    let node = network.node_mut(idx);
    if node.is_well() {
        return Err(FlowError::Validation(format!(
            "well '{}' cannot receive flow",
            node.label()
        )));
    }
    node.add_to_stream(t, stream)?;

    let outflow = match node {
        Node::EndPipe(_) => return Ok(()),
        Node::Separator(sep) => sep.separate(t, stream, removal_fraction, installed)?,
        Node::MidPipe(_) | Node::Booster(_) | Node::Well(_) => *stream,
    };

    let outlets = match network.node(idx) {
        Node::MidPipe(_) => {
            let outlets = network.outlets(idx);
            if outlets.is_empty() {
                return Err(FlowError::MissingOutlet(network.label(idx).to_string()));
            }
            outlets
        }
        _ => vec![network.single_outlet(idx)?],
    };
    for (target, routing) in outlets {
        let fraction = network.variables.value(routing);
        route_stream(network, target, t, &outflow.scale(fraction))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::{
        EndPipe, MidPipe, Schedule, Separator, SeparatorKind, UnitSystem, VariableKind, Well,
    };

    #[test]
    fn test_split_and_merge() {
        let mut net = Network::new(UnitSystem::Metric);
        let well = net.add_node(Node::Well(Well::production("P1")));
        let a = net.add_node(Node::MidPipe(MidPipe::new("a")));
        let b = net.add_node(Node::MidPipe(MidPipe::new("b")));
        let end = net.add_node(Node::EndPipe(EndPipe::new("e", 10.0, UnitSystem::Metric)));
        net.connect_fixed(well, a, 0.3);
        net.connect_fixed(well, b, 0.7);
        net.connect_fixed(a, end, 1.0);
        net.connect_fixed(b, end, 1.0);
        net.initialize(Schedule::new(vec![1.0]).unwrap()).unwrap();
        net.set_well_streams(well, vec![Stream::new(1.0, 100.0, 50.0, 10.0, 200.0)])
            .unwrap();

        CoupledModel
            .propagate(&mut net, &mut Diagnostics::new())
            .unwrap();
        assert!((net.node(a).streams()[0].oil_rate - 30.0).abs() < 1e-9);
        assert!((net.node(b).streams()[0].gas_rate - 35.0).abs() < 1e-9);
        assert!((net.node(end).streams()[0].oil_rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_uninstalled_well_contributes_nothing() {
        let mut net = Network::new(UnitSystem::Metric);
        let install = net.variables.add("install", VariableKind::Integer, 1.0, 0.0, 1.0);
        let well = net.add_node(Node::Well(Well::production("P1").with_install_time(install)));
        let end = net.add_node(Node::EndPipe(EndPipe::new("e", 10.0, UnitSystem::Metric)));
        net.connect_fixed(well, end, 1.0);
        net.initialize(Schedule::new(vec![1.0, 2.0]).unwrap()).unwrap();
        net.set_well_streams(
            well,
            vec![
                Stream::new(1.0, 10.0, 0.0, 0.0, 0.0),
                Stream::new(2.0, 10.0, 0.0, 0.0, 0.0),
            ],
        )
        .unwrap();

        CoupledModel
            .propagate(&mut net, &mut Diagnostics::new())
            .unwrap();
        assert_eq!(net.node(end).streams()[0].oil_rate, 0.0);
        assert_eq!(net.node(end).streams()[1].oil_rate, 10.0);
    }

    #[test]
    fn test_separator_removes_once() {
        let mut net = Network::new(UnitSystem::Metric);
        let frac = net.variables.add_fixed("frac", 1.0);
        let cap = net.variables.add_fixed("cap", 15.0);
        let well = net.add_node(Node::Well(Well::production("P1")));
        let sep = net.add_node(Node::Separator(Separator::new(
            "sep",
            SeparatorKind::Water,
            frac,
            cap,
        )));
        let end = net.add_node(Node::EndPipe(EndPipe::new("e", 10.0, UnitSystem::Metric)));
        net.connect_fixed(well, sep, 1.0);
        net.connect_fixed(sep, end, 1.0);
        net.initialize(Schedule::new(vec![1.0]).unwrap()).unwrap();
        net.set_well_streams(well, vec![Stream::new(1.0, 100.0, 0.0, 40.0, 0.0)])
            .unwrap();
        net.empty_streams();

        CoupledModel
            .propagate(&mut net, &mut Diagnostics::new())
            .unwrap();
        // inflow is recorded before removal
        assert_eq!(net.node(sep).streams()[0].water_rate, 40.0);
        assert_eq!(net.node(end).streams()[0].water_rate, 25.0);
        assert_eq!(net.node(end).streams()[0].oil_rate, 100.0);
    }

    #[test]
    fn test_mid_pipe_without_outlet_is_fatal() {
        let mut net = Network::new(UnitSystem::Metric);
        let well = net.add_node(Node::Well(Well::production("P1")));
        let mid = net.add_node(Node::MidPipe(MidPipe::new("dead-end")));
        net.connect_fixed(well, mid, 1.0);
        net.initialize(Schedule::new(vec![1.0]).unwrap()).unwrap();
        net.set_well_streams(well, vec![Stream::new(1.0, 1.0, 0.0, 0.0, 0.0)])
            .unwrap();
        let err = CoupledModel
            .propagate(&mut net, &mut Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, FlowError::MissingOutlet(name) if name == "dead-end"));
    }
}
