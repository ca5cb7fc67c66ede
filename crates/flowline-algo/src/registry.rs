use crate::formulation::{CoupledModel, DecoupledModel, Formulation};
use crate::objective::{CumulativeGas, CumulativeOil, Npv, Objective};
use flowline_core::{Diagnostics, FlowError, FlowResult, Network};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default upper bound of decoupled rate variables.
pub const DEFAULT_MAX_RATE: f64 = 1.0e6;

/// Registry of available propagation formulations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulationKind {
    #[default]
    Coupled,
    Decoupled,
}

impl FormulationKind {
    pub fn from_str(input: &str) -> FlowResult<Self> {
        match input.to_ascii_lowercase().as_str() {
            "coupled" | "default" => Ok(FormulationKind::Coupled),
            "decoupled" | "relaxed" => Ok(FormulationKind::Decoupled),
            other => Err(FlowError::Config(format!(
                "unknown formulation '{other}'; supported values: coupled, decoupled"
            ))),
        }
    }

    /// Build the formulation for `network`.
    ///
    /// The decoupled formulation installs its rate variables on the network
    /// and starts them at the coupled solution.
    pub fn build(self, network: &mut Network, max_rate: f64) -> FlowResult<Arc<dyn Formulation>> {
        match self {
            FormulationKind::Coupled => Ok(Arc::new(CoupledModel)),
            FormulationKind::Decoupled => {
                let model = DecoupledModel::install(network, max_rate)?;
                model.synchronize(network, &mut Diagnostics::new())?;
                Ok(Arc::new(model))
            }
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["coupled", "decoupled"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormulationKind::Coupled => "coupled",
            FormulationKind::Decoupled => "decoupled",
        }
    }
}

/// Objective selection as written in a case file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectiveSpec {
    #[default]
    CumulativeOil,
    CumulativeGas,
    Npv(Npv),
}

impl ObjectiveSpec {
    pub fn from_str(input: &str) -> FlowResult<Self> {
        match input.to_ascii_lowercase().as_str() {
            "cumulative_oil" | "oil" => Ok(ObjectiveSpec::CumulativeOil),
            "cumulative_gas" | "gas" => Ok(ObjectiveSpec::CumulativeGas),
            "npv" => Ok(ObjectiveSpec::Npv(Npv::default())),
            other => Err(FlowError::Config(format!(
                "unknown objective '{other}'; supported values: cumulative_oil, cumulative_gas, npv"
            ))),
        }
    }

    pub fn build(self) -> Arc<dyn Objective> {
        match self {
            ObjectiveSpec::CumulativeOil => Arc::new(CumulativeOil),
            ObjectiveSpec::CumulativeGas => Arc::new(CumulativeGas),
            ObjectiveSpec::Npv(npv) => Arc::new(npv),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::{EndPipe, Node, Schedule, Stream, UnitSystem, Well};

    #[test]
    fn formulation_kind_parsing() {
        assert_eq!(
            FormulationKind::from_str("Coupled").unwrap(),
            FormulationKind::Coupled
        );
        assert_eq!(
            FormulationKind::from_str("relaxed").unwrap(),
            FormulationKind::Decoupled
        );
        assert!(matches!(
            FormulationKind::from_str("implicit"),
            Err(FlowError::Config(_))
        ));
    }

    #[test]
    fn defaults_are_coupled_cumulative_oil() {
        assert_eq!(FormulationKind::default(), FormulationKind::Coupled);
        assert_eq!(ObjectiveSpec::default(), ObjectiveSpec::CumulativeOil);
        assert_eq!(ObjectiveSpec::default().build().name(), "cumulative_oil");
    }

    #[test]
    fn objective_spec_from_yaml_like_json() {
        let spec: ObjectiveSpec =
            serde_json::from_str(r#"{"type": "npv", "oil_price": 70.0, "discount_rate": 0.0}"#)
                .unwrap();
        assert_eq!(spec.build().name(), "npv");
        let spec: ObjectiveSpec = serde_json::from_str(r#"{"type": "cumulative_gas"}"#).unwrap();
        assert_eq!(spec, ObjectiveSpec::CumulativeGas);
        assert!(ObjectiveSpec::from_str("irr").is_err());
    }

    #[test]
    fn decoupled_build_installs_and_synchronizes() {
        let mut net = Network::new(UnitSystem::Metric);
        let well = net.add_node(Node::Well(Well::production("P1")));
        let end = net.add_node(Node::EndPipe(EndPipe::new("e", 50.0, UnitSystem::Metric)));
        net.connect_fixed(well, end, 1.0);
        net.initialize(Schedule::new(vec![1.0]).unwrap()).unwrap();
        net.set_well_streams(well, vec![Stream::new(1.0, 42.0, 0.0, 0.0, 0.0)])
            .unwrap();

        let formulation = FormulationKind::Decoupled.build(&mut net, 1e3).unwrap();
        assert_eq!(formulation.id(), "decoupled");
        assert_eq!(net.variables.by_name("rate:e:oil:0").unwrap().value, 42.0);
    }
}
