//! # flowline-core: Surface Production Network Model
//!
//! Provides the data structures for modeling a surface production network
//! (wells, pipes, separators, pressure boosters) as a directed acyclic graph.
//!
//! ## Design Philosophy
//!
//! Networks are modeled as a **directed graph** (petgraph `DiGraph`) where:
//! - **Nodes**: [`Node`] variants for wells, terminal pipes, branching pipes,
//!   separators and pressure boosters
//! - **Edges**: [`Connection`]s from a feeding node to the node it routes into,
//!   each carrying a routing-fraction decision variable
//!
//! Node indices are the stable handles of the arena: the graph is built once and
//! never loses nodes, so an index stays valid for the whole optimization run.
//! Back-references (feeders of a pipe) are answered by incoming edges instead of
//! stored pointers.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowline_core::*;
//!
//! let mut network = Network::new(UnitSystem::Metric);
//! let well = network.add_node(Node::Well(Well::production("P1")));
//! let manifold = network.add_node(Node::MidPipe(MidPipe::new("manifold")));
//! let export = network.add_node(Node::EndPipe(EndPipe::new("export", 50.0, UnitSystem::Metric)));
//!
//! network.connect_fixed(well, manifold, 1.0);
//! network.connect_fixed(manifold, export, 1.0);
//!
//! network.initialize(Schedule::new(vec![30.0, 60.0]).unwrap()).unwrap();
//! network
//!     .set_well_streams(well, vec![
//!         Stream::new(30.0, 100.0, 0.0, 0.0, 120.0),
//!         Stream::new(60.0, 90.0, 0.0, 5.0, 115.0),
//!     ])
//!     .unwrap();
//! assert_eq!(network.stats().production_wells, 1);
//! ```
//!
//! ## Modules
//!
//! - [`stream`] - phase-rate records and their superposition
//! - [`units`] - METRIC/FIELD conversions
//! - [`components`] - per-kind component data
//! - [`network`] - the graph container, capacities and user constraints
//! - [`variables`] - decision variables
//! - [`diagnostics`] - warnings and validation errors
//! - [`graph_utils`] - topological order and graph export

pub use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

pub mod components;
pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod network;
pub mod pressure_drop;
pub mod schedule;
pub mod stream;
pub mod units;
pub mod variables;

pub use components::{
    ControlMode, CostEvent, EndPipe, InstallCost, MidPipe, PressureBooster, Separator,
    SeparatorKind, Well, WellControl, WellKind,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{FlowError, FlowResult};
pub use network::{Capacity, Network, NetworkStats, Property, Term, UserConstraint};
pub use pressure_drop::{PressureDrop, PressureTable};
pub use schedule::Schedule;
pub use stream::Stream;
pub use units::{Bara, Phase, Psia, UnitSystem};
pub use variables::{DecisionVariable, VarId, VariableKind, VariableSet};

/// Edge payload: the share of the feeder's flow routed along this connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub routing: VarId,
}

// Enum to represent the different kinds of nodes in the graph
#[derive(Debug, Clone)]
pub enum Node {
    Well(Well),
    EndPipe(EndPipe),
    MidPipe(MidPipe),
    Separator(Separator),
    Booster(PressureBooster),
}

impl Node {
    /// Returns the component name.
    pub fn label(&self) -> &str {
        match self {
            Node::Well(w) => &w.name,
            Node::EndPipe(p) => &p.name,
            Node::MidPipe(p) => &p.name,
            Node::Separator(s) => &s.name,
            Node::Booster(b) => &b.name,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Well(w) if w.is_production() => "production_well",
            Node::Well(_) => "injection_well",
            Node::EndPipe(_) => "end_pipe",
            Node::MidPipe(_) => "mid_pipe",
            Node::Separator(_) => "separator",
            Node::Booster(_) => "booster",
        }
    }

    pub fn streams(&self) -> &[Stream] {
        match self {
            Node::Well(w) => &w.streams,
            Node::EndPipe(p) => &p.streams,
            Node::MidPipe(p) => &p.streams,
            Node::Separator(s) => &s.streams,
            Node::Booster(b) => &b.streams,
        }
    }

    pub fn streams_mut(&mut self) -> &mut Vec<Stream> {
        match self {
            Node::Well(w) => &mut w.streams,
            Node::EndPipe(p) => &mut p.streams,
            Node::MidPipe(p) => &mut p.streams,
            Node::Separator(s) => &mut s.streams,
            Node::Booster(b) => &mut b.streams,
        }
    }

    pub fn is_well(&self) -> bool {
        matches!(self, Node::Well(_))
    }

    pub fn as_well(&self) -> Option<&Well> {
        match self {
            Node::Well(w) => Some(w),
            _ => None,
        }
    }

    /// Install-time variable, for the kinds that have one.
    pub fn install_time(&self) -> Option<VarId> {
        match self {
            Node::Well(w) => w.install_time,
            Node::Separator(s) => s.install_time,
            Node::Booster(b) => b.install_time,
            Node::EndPipe(_) | Node::MidPipe(_) => None,
        }
    }

    /// Allocate one zero-valued stream per schedule entry.
    ///
    /// Calling this again with the same schedule leaves the same layout.
    pub fn initialize(&mut self, schedule: &Schedule, units: UnitSystem) {
        let fresh: Vec<Stream> = schedule
            .times()
            .iter()
            .map(|&t| Stream::empty(t, units))
            .collect();
        if let Node::Separator(sep) = self {
            sep.remaining = vec![0.0; fresh.len()];
            sep.removed = fresh.clone();
        }
        *self.streams_mut() = fresh;
    }

    /// Zero rates and pressure, keep timestamps.
    pub fn empty_streams(&mut self) {
        for s in self.streams_mut().iter_mut() {
            *s = s.zeroed();
        }
    }

    /// Superpose `stream` into slot `index`.
    pub fn add_to_stream(&mut self, index: usize, stream: &Stream) -> FlowResult<()> {
        let len = self.streams().len();
        if index >= len {
            return Err(FlowError::StreamIndex {
                component: self.label().to_string(),
                index,
                len,
            });
        }
        let slot = &mut self.streams_mut()[index];
        *slot += stream;
        Ok(())
    }
}
