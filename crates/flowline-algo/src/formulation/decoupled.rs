//! Relaxed formulation with explicit segment rate variables.
//!
//! Every pipe, separator and booster gets one oil/gas/water rate variable per
//! schedule index standing for what flows into it. Segment streams are built
//! from those variables, and material-balance constraints measure how far the
//! variables are from what the wells and upstream segments actually deliver.

use super::coupled::CoupledModel;
use super::Formulation;
use crate::constraints::{ConstraintKind, ConstraintSet};
use flowline_core::{
    Diagnostics, FlowError, FlowResult, Network, Node, NodeIndex, Phase, Stream, VarId,
    VariableKind,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Rate variables of one segment, indexed by schedule index then phase
/// (oil, gas, water).
pub type SegmentRates = Vec<[VarId; 3]>;

#[derive(Debug, Clone, Default)]
pub struct DecoupledModel {
    rates: BTreeMap<NodeIndex, SegmentRates>,
}

impl DecoupledModel {
    /// Create the rate variables on an initialized network.
    ///
    /// Variables start at zero with bounds `[0, max_rate]` and are owned by
    /// their segment.
    pub fn install(network: &mut Network, max_rate: f64) -> FlowResult<Self> {
        if network.schedule.is_empty() {
            return Err(FlowError::Validation(
                "network must be initialized before installing rate variables".into(),
            ));
        }
        let segments: Vec<NodeIndex> = network.segments().collect();
        let mut rates = BTreeMap::new();
        for seg in segments {
            let name = network.label(seg).to_string();
            let per_time: SegmentRates = (0..network.schedule.len())
                .map(|t| {
                    Phase::ALL.map(|phase| {
                        let id = network.variables.add(
                            format!("rate:{name}:{phase}:{t}"),
                            VariableKind::Real,
                            0.0,
                            0.0,
                            max_rate,
                        );
                        network.variables.set_owner(id, seg);
                        id
                    })
                })
                .collect();
            rates.insert(seg, per_time);
        }
        debug!(segments = rates.len(), "decoupled rate variables installed");
        Ok(Self { rates })
    }

    pub fn rates(&self, segment: NodeIndex) -> Option<&SegmentRates> {
        self.rates.get(&segment)
    }

    /// Rate variable of `segment` for `phase` at schedule index `t`.
    pub fn rate_variable(&self, segment: NodeIndex, t: usize, phase: Phase) -> Option<VarId> {
        self.rates
            .get(&segment)
            .and_then(|r| r.get(t))
            .map(|ids| ids[phase_slot(phase)])
    }

    /// Set every rate variable to the rate the coupled propagation delivers.
    pub fn synchronize(&self, network: &mut Network, diag: &mut Diagnostics) -> FlowResult<()> {
        network.empty_streams();
        CoupledModel.propagate(network, diag)?;
        for (&seg, per_time) in &self.rates {
            for (t, ids) in per_time.iter().enumerate() {
                let stream = network
                    .node(seg)
                    .streams()
                    .get(t)
                    .copied()
                    .unwrap_or_default();
                for phase in Phase::ALL {
                    network
                        .variables
                        .set_value(ids[phase_slot(phase)], stream.rate(phase));
                }
            }
        }
        network.empty_streams();
        Ok(())
    }

    fn variable_stream(&self, network: &Network, ids: &[VarId; 3], time: f64) -> Stream {
        let mut stream = Stream::empty(time, network.units);
        for phase in Phase::ALL {
            stream.set_rate(phase, network.variables.value(ids[phase_slot(phase)]));
        }
        stream
    }
}

fn phase_slot(phase: Phase) -> usize {
    match phase {
        Phase::Oil => 0,
        Phase::Gas => 1,
        Phase::Water => 2,
    }
}

impl Formulation for DecoupledModel {
    fn id(&self) -> &str {
        "decoupled"
    }

    fn propagate(&self, network: &mut Network, _diag: &mut Diagnostics) -> FlowResult<()> {
        network.check_schedule()?;
        let times = network.schedule.len();

        // segment streams come from the rate variables
        for (&seg, per_time) in &self.rates {
            if per_time.len() != times {
                return Err(FlowError::ScheduleMismatch {
                    component: network.label(seg).to_string(),
                    expected: times,
                    found: per_time.len(),
                });
            }
            for (t, ids) in per_time.iter().enumerate() {
                let time = network.schedule.time(t).unwrap_or_default();
                let stream = self.variable_stream(network, ids, time);
                network.node_mut(seg).streams_mut()[t] = stream;
            }
        }

        let mut superposed: HashMap<NodeIndex, Vec<Stream>> = self
            .rates
            .keys()
            .map(|&seg| {
                let empty = network
                    .schedule
                    .times()
                    .iter()
                    .map(|&time| Stream::empty(time, network.units))
                    .collect();
                (seg, empty)
            })
            .collect();

        let wells: Vec<NodeIndex> = network.production_wells().collect();
        for well in wells {
            for t in 0..times {
                if !network.is_installed(well, t) {
                    continue;
                }
                let stream = network.node(well).streams()[t];
                for (target, routing) in network.outlets(well) {
                    let fraction = network.variables.value(routing);
                    accumulate(&mut superposed, network, target, t, &stream.scale(fraction))?;
                }
            }
        }

        for &seg in self.rates.keys() {
            let outlets = match network.node(seg) {
                Node::EndPipe(_) => continue,
                _ => network.outlets(seg),
            };
            for t in 0..times {
                let outflow = segment_outflow(network, seg, t)?;
                // each connection carries its own routing fraction
                for &(target, routing) in &outlets {
                    let fraction = network.variables.value(routing);
                    accumulate(&mut superposed, network, target, t, &outflow.scale(fraction))?;
                }
            }
        }

        network.superposed = superposed;
        Ok(())
    }

    fn append_constraints(&self, network: &Network, set: &mut ConstraintSet) -> FlowResult<()> {
        for (&seg, per_time) in &self.rates {
            let name = network.label(seg);
            let actual = network.superposed.get(&seg).ok_or_else(|| {
                FlowError::MaterialBalance(format!("no superposed stream for '{name}'"))
            })?;
            for (t, ids) in per_time.iter().enumerate() {
                let stream = actual.get(t).ok_or_else(|| {
                    FlowError::MaterialBalance(format!(
                        "no superposed stream for '{name}' at index {t}"
                    ))
                })?;
                for phase in Phase::ALL {
                    let variable = network.variables.value(ids[phase_slot(phase)]);
                    set.push(
                        ConstraintKind::MaterialBalance,
                        format!("balance:{name}:{phase}:{t}"),
                        stream.rate(phase) - variable,
                        0.0,
                        0.0,
                    );
                }
            }
        }
        Ok(())
    }
}

/// What a segment passes on at index `t`, after separator removal.
fn segment_outflow(network: &mut Network, seg: NodeIndex, t: usize) -> FlowResult<Stream> {
    let installed = network.is_installed(seg, t);
    let fraction = match network.node(seg) {
        Node::Separator(sep) => network.variables.value(sep.remove_fraction),
        _ => 0.0,
    };
    match network.node_mut(seg) {
        Node::Separator(sep) => {
            let inflow = sep.streams[t];
            sep.separate(t, &inflow, fraction, installed)
        }
        node => Ok(node.streams()[t]),
    }
}

fn accumulate(
    superposed: &mut HashMap<NodeIndex, Vec<Stream>>,
    network: &Network,
    target: NodeIndex,
    t: usize,
    stream: &Stream,
) -> FlowResult<()> {
    if network.node(target).is_well() {
        return Err(FlowError::Validation(format!(
            "well '{}' cannot receive flow",
            network.label(target)
        )));
    }
    let slot = superposed
        .get_mut(&target)
        .and_then(|streams| streams.get_mut(t))
        .ok_or_else(|| {
            FlowError::MaterialBalance(format!(
                "'{}' has no rate variables at index {t}",
                network.label(target)
            ))
        })?;
    *slot += stream;
    Ok(())
}
