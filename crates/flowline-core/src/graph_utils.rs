use crate::error::{FlowError, FlowResult};
use crate::{Network, NodeIndex};
use petgraph::algo::toposort;
use petgraph::visit::EdgeRef;

/// Nodes ordered from the wells towards the terminal pipes.
///
/// Fails with [`FlowError::Cycle`] when the topology is not acyclic.
pub fn topological_order(network: &Network) -> FlowResult<Vec<NodeIndex>> {
    toposort(&network.graph, None)
        .map_err(|cycle| FlowError::Cycle(network.label(cycle.node_id()).to_string()))
}

/// Nodes ordered from the terminal pipes back towards the wells.
///
/// Every node appears after all of its downstream neighbours, which is the
/// order inlet pressures have to be computed in.
pub fn downstream_first(network: &Network) -> FlowResult<Vec<NodeIndex>> {
    let mut order = topological_order(network)?;
    order.reverse();
    Ok(order)
}

/// Export the topology to a DOT string (Graphviz) so external tools can visualize the layout.
pub fn export_graph(network: &Network, format: &str) -> FlowResult<String> {
    match format.to_ascii_lowercase().as_str() {
        "graphviz" | "dot" => Ok(render_dot(network)),
        other => Err(FlowError::Config(format!(
            "unsupported graph export format '{other}'"
        ))),
    }
}

fn render_dot(network: &Network) -> String {
    let mut buffer = String::new();
    buffer.push_str("digraph flowline_network {\n");
    for node in network.graph.node_indices() {
        let label = sanitize_label(network.graph[node].label());
        let shape = match network.graph[node].kind_name() {
            "production_well" | "injection_well" => "invtriangle",
            "separator" => "box",
            "booster" => "diamond",
            _ => "ellipse",
        };
        buffer.push_str(&format!(
            "  n{} [label=\"{}\", shape={}];\n",
            node.index(),
            label,
            shape
        ));
    }
    for edge in network.graph.edge_references() {
        let source = edge.source().index();
        let target = edge.target().index();
        let fraction = network.variables.value(edge.weight().routing);
        buffer.push_str(&format!("  n{source} -> n{target} [label=\"{fraction:.2}\"];\n"));
    }
    buffer.push('}');
    buffer
}

fn sanitize_label(label: &str) -> String {
    label.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EndPipe, MidPipe, Node, UnitSystem, Well};

    #[test]
    fn test_downstream_first_puts_end_pipe_first() {
        let mut net = Network::new(UnitSystem::Metric);
        let well = net.add_node(Node::Well(Well::production("P1")));
        let mid = net.add_node(Node::MidPipe(MidPipe::new("m")));
        let end = net.add_node(Node::EndPipe(EndPipe::new("e", 50.0, UnitSystem::Metric)));
        net.connect_fixed(well, mid, 1.0);
        net.connect_fixed(mid, end, 1.0);

        let order = downstream_first(&net).unwrap();
        let pos = |n| order.iter().position(|&x| x == n).unwrap();
        assert!(pos(end) < pos(mid));
        assert!(pos(mid) < pos(well));
    }

    #[test]
    fn test_cycle_detected() {
        let mut net = Network::new(UnitSystem::Metric);
        let a = net.add_node(Node::MidPipe(MidPipe::new("a")));
        let b = net.add_node(Node::MidPipe(MidPipe::new("b")));
        net.connect_fixed(a, b, 1.0);
        net.connect_fixed(b, a, 1.0);
        assert!(matches!(topological_order(&net), Err(FlowError::Cycle(_))));
    }

    #[test]
    fn test_export_dot() {
        let mut net = Network::new(UnitSystem::Metric);
        let well = net.add_node(Node::Well(Well::production("P\"1")));
        let end = net.add_node(Node::EndPipe(EndPipe::new("e", 50.0, UnitSystem::Metric)));
        net.connect_fixed(well, end, 0.5);
        let dot = export_graph(&net, "dot").unwrap();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("P\\\"1"));
        assert!(dot.contains("n0 -> n1 [label=\"0.50\"]"));
        assert!(export_graph(&net, "svg").is_err());
    }
}
