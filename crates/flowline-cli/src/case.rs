//! Case files: the serde schema a network, its variables and the evaluation
//! settings are loaded from.
//!
//! Case files are YAML or JSON. Anything that takes a decision variable
//! accepts either a number (a fixed value) or the name of a variable declared
//! under `variables`.

use anyhow::{anyhow, bail, Context, Result};
use flowline_algo::{
    AdjointRecord, AdjointTable, Evaluator, FormulationKind, ObjectiveSpec, SensitivityEngine,
    SensitivitySettings, DEFAULT_MAX_RATE,
};
use flowline_core::{
    Capacity, ControlMode, EndPipe, InstallCost, MidPipe, Network, Node, NodeIndex,
    PressureBooster, PressureDrop, Schedule, Separator, SeparatorKind, Stream, UnitSystem,
    UserConstraint, VarId, VariableKind, Well, WellControl,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseFile {
    #[serde(default)]
    pub units: UnitSystem,
    pub schedule: Vec<f64>,
    #[serde(default)]
    pub formulation: FormulationKind,
    /// Upper bound of decoupled segment rate variables
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,
    #[serde(default)]
    pub objective: ObjectiveSpec,
    #[serde(default)]
    pub sensitivity: SensitivitySettings,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
    #[serde(default)]
    pub capacities: Vec<CapacitySpec>,
    #[serde(default)]
    pub user_constraints: Vec<UserConstraint>,
    #[serde(default)]
    pub adjoints: Vec<AdjointSpec>,
}

fn default_max_rate() -> f64 {
    DEFAULT_MAX_RATE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: VariableKind,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

fn default_kind() -> VariableKind {
    VariableKind::Real
}

/// A fixed number or the name of a declared variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarRef {
    Fixed(f64),
    Named(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSpec {
    pub time_index: usize,
    pub mode: ControlMode,
    pub variable: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentSpec {
    ProductionWell(WellSpec),
    InjectionWell(WellSpec),
    EndPipe {
        name: String,
        outlet_pressure: f64,
        #[serde(default)]
        outlet_units: Option<UnitSystem>,
        #[serde(default)]
        pressure_drop: PressureDrop,
    },
    MidPipe {
        name: String,
        #[serde(default)]
        pressure_drop: PressureDrop,
    },
    Separator {
        name: String,
        kind: SeparatorKind,
        remove_fraction: VarRef,
        remove_capacity: VarRef,
        #[serde(default)]
        install_time: Option<String>,
        #[serde(default)]
        cost: Option<InstallCost>,
    },
    Booster {
        name: String,
        pressure_increase: VarRef,
        capacity: VarRef,
        #[serde(default)]
        install_time: Option<String>,
        #[serde(default)]
        cost: Option<InstallCost>,
    },
}

/// A well stream as written in a case file.
///
/// `units` defaults to the unit system of the case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StreamSpec {
    pub time: f64,
    #[serde(default)]
    pub oil_rate: f64,
    #[serde(default)]
    pub gas_rate: f64,
    #[serde(default)]
    pub water_rate: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<UnitSystem>,
}

impl StreamSpec {
    pub fn to_stream(&self, case_units: UnitSystem) -> Stream {
        Stream::new(
            self.time,
            self.oil_rate,
            self.gas_rate,
            self.water_rate,
            self.pressure,
        )
        .with_units(self.units.unwrap_or(case_units))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellSpec {
    pub name: String,
    #[serde(default)]
    pub streams: Vec<StreamSpec>,
    #[serde(default)]
    pub controls: Vec<ControlSpec>,
    #[serde(default)]
    pub install_time: Option<String>,
    #[serde(default)]
    pub cost: Option<InstallCost>,
    #[serde(default = "default_must_route")]
    pub must_route: bool,
}

fn default_must_route() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub from: String,
    pub to: String,
    #[serde(default = "default_routing")]
    pub routing: VarRef,
}

fn default_routing() -> VarRef {
    VarRef::Fixed(1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacitySpec {
    pub name: String,
    pub feeds: Vec<String>,
    #[serde(default)]
    pub max_oil: Option<f64>,
    #[serde(default)]
    pub max_gas: Option<f64>,
    #[serde(default)]
    pub max_water: Option<f64>,
    #[serde(default)]
    pub max_liquid: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjointSpec {
    pub well: String,
    pub time_index: usize,
    pub variable: String,
    #[serde(default)]
    pub d_oil: f64,
    #[serde(default)]
    pub d_gas: f64,
    #[serde(default)]
    pub d_water: f64,
    #[serde(default)]
    pub d_pressure: f64,
}

pub fn load_case_from_path(path: &Path) -> Result<CaseFile> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading case '{}'", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).context("parsing case yaml")
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).context("parsing case json")
        }
        _ => serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .context("parsing case"),
    }
}

/// A case turned into a network plus everything needed to evaluate it.
pub struct LoadedCase {
    pub network: Network,
    pub engine: SensitivityEngine,
    pub adjoints: AdjointTable,
}

/// Build the network described by `case` without evaluating it.
pub fn build_network(case: &CaseFile) -> Result<Network> {
    let mut network = Network::new(case.units);
    let mut names: HashMap<String, VarId> = HashMap::new();
    for spec in &case.variables {
        if spec.min > spec.max {
            bail!("variable '{}' has min > max", spec.name);
        }
        let id = network
            .variables
            .add(spec.name.clone(), spec.kind, spec.value, spec.min, spec.max);
        if names.insert(spec.name.clone(), id).is_some() {
            bail!("duplicate variable '{}'", spec.name);
        }
    }

    let mut well_streams: Vec<(NodeIndex, Vec<Stream>)> = Vec::new();
    for component in &case.components {
        let node = build_component(component, &mut network, &names)?;
        let name = node.label().to_string();
        if network.find(&name).is_some() {
            bail!("duplicate component '{name}'");
        }
        let idx = network.add_node(node);
        if let ComponentSpec::ProductionWell(w) | ComponentSpec::InjectionWell(w) = component {
            if !w.streams.is_empty() {
                let streams = w.streams.iter().map(|s| s.to_stream(case.units)).collect();
                well_streams.push((idx, streams));
            }
        }
    }

    for conn in &case.connections {
        let from = network.require(&conn.from)?;
        let to = network.require(&conn.to)?;
        let label = format!("route:{}->{}", conn.from, conn.to);
        let routing = resolve(&conn.routing, &label, &mut network, &names)?;
        network.connect(from, to, routing);
    }

    for cap in &case.capacities {
        let feeds = cap
            .feeds
            .iter()
            .map(|f| network.require(f))
            .collect::<Result<Vec<_>, _>>()?;
        network.capacities.push(Capacity {
            name: cap.name.clone(),
            feeds,
            max_oil: cap.max_oil,
            max_gas: cap.max_gas,
            max_water: cap.max_water,
            max_liquid: cap.max_liquid,
        });
    }
    network.user_constraints = case.user_constraints.clone();

    let schedule = Schedule::new(case.schedule.clone()).context("reading schedule")?;
    network.initialize(schedule)?;
    for (idx, streams) in well_streams {
        network.set_well_streams(idx, streams)?;
    }
    debug!(stats = %network.stats(), "network built");
    Ok(network)
}

/// Build the network, formulation, objective and adjoint table of `case`.
pub fn load(case: &CaseFile) -> Result<LoadedCase> {
    case.sensitivity.check().context("reading sensitivity settings")?;
    let mut network = build_network(case)?;
    let formulation = case.formulation.build(&mut network, case.max_rate)?;
    let objective = case.objective.build();
    info!(
        formulation = formulation.id(),
        objective = objective.name(),
        "case loaded"
    );

    let variables: HashMap<&str, VarId> = network
        .variables
        .iter()
        .map(|v| (v.name.as_str(), v.id))
        .collect();
    let adjoints = case
        .adjoints
        .iter()
        .map(|a| -> Result<AdjointRecord> {
            let well = network.require(&a.well)?;
            if !network.node(well).is_well() {
                bail!("adjoint record refers to '{}', which is not a well", a.well);
            }
            let variable = *variables.get(a.variable.as_str()).ok_or_else(|| {
                anyhow!("adjoint record refers to unknown variable '{}'", a.variable)
            })?;
            Ok(AdjointRecord {
                well,
                time_index: a.time_index,
                variable,
                d_oil: a.d_oil,
                d_gas: a.d_gas,
                d_water: a.d_water,
                d_pressure: a.d_pressure,
            })
        })
        .collect::<Result<AdjointTable>>()?;

    Ok(LoadedCase {
        network,
        engine: SensitivityEngine::new(Evaluator::new(formulation, objective), case.sensitivity),
        adjoints,
    })
}

fn build_component(
    spec: &ComponentSpec,
    network: &mut Network,
    names: &HashMap<String, VarId>,
) -> Result<Node> {
    let lookup = |name: &Option<String>| -> Result<Option<VarId>> {
        name.as_ref().map(|n| named(n, names)).transpose()
    };
    let node = match spec {
        ComponentSpec::ProductionWell(w) | ComponentSpec::InjectionWell(w) => {
            let mut well = if matches!(spec, ComponentSpec::ProductionWell(_)) {
                Well::production(w.name.clone())
            } else {
                Well::injection(w.name.clone())
            };
            well.install_time = lookup(&w.install_time)?;
            well.cost = w.cost;
            well.must_route = w.must_route;
            for c in &w.controls {
                well = well.with_control(WellControl {
                    time_index: c.time_index,
                    mode: c.mode,
                    variable: named(&c.variable, names)?,
                });
            }
            Node::Well(well)
        }
        ComponentSpec::EndPipe {
            name,
            outlet_pressure,
            outlet_units,
            pressure_drop,
        } => {
            check_drop(name, pressure_drop)?;
            Node::EndPipe(
                EndPipe::new(
                    name.clone(),
                    *outlet_pressure,
                    outlet_units.unwrap_or(network.units),
                )
                .with_pressure_drop(pressure_drop.clone()),
            )
        }
        ComponentSpec::MidPipe {
            name,
            pressure_drop,
        } => {
            check_drop(name, pressure_drop)?;
            Node::MidPipe(MidPipe::new(name.clone()).with_pressure_drop(pressure_drop.clone()))
        }
        ComponentSpec::Separator {
            name,
            kind,
            remove_fraction,
            remove_capacity,
            install_time,
            cost,
        } => {
            let fraction = resolve(remove_fraction, &format!("{name}:fraction"), network, names)?;
            let capacity = resolve(remove_capacity, &format!("{name}:capacity"), network, names)?;
            let mut sep = Separator::new(name.clone(), *kind, fraction, capacity);
            sep.install_time = lookup(install_time)?;
            sep.cost = *cost;
            Node::Separator(sep)
        }
        ComponentSpec::Booster {
            name,
            pressure_increase,
            capacity,
            install_time,
            cost,
        } => {
            let dp = resolve(pressure_increase, &format!("{name}:dp"), network, names)?;
            let capacity = resolve(capacity, &format!("{name}:capacity"), network, names)?;
            let mut booster = PressureBooster::new(name.clone(), dp, capacity);
            booster.install_time = lookup(install_time)?;
            booster.cost = *cost;
            Node::Booster(booster)
        }
    };
    Ok(node)
}

fn check_drop(name: &str, drop: &PressureDrop) -> Result<()> {
    if let PressureDrop::Table(table) = drop {
        table
            .check()
            .map_err(|e| anyhow!("pressure table of '{name}': {e}"))?;
    }
    Ok(())
}

fn named(name: &str, names: &HashMap<String, VarId>) -> Result<VarId> {
    names
        .get(name)
        .copied()
        .ok_or_else(|| anyhow!("unknown variable '{name}'"))
}

fn resolve(
    var: &VarRef,
    label: &str,
    network: &mut Network,
    names: &HashMap<String, VarId>,
) -> Result<VarId> {
    match var {
        VarRef::Fixed(value) => Ok(network.variables.add_fixed(label, *value)),
        VarRef::Named(name) => named(name, names),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CHAIN: &str = r#"
units: metric
schedule: [30, 60]
variables:
  - {name: split, value: 0.6, min: 0, max: 1}
components:
  - type: production_well
    name: P1
    streams:
      - {time: 30, oil_rate: 100, gas_rate: 0, water_rate: 0, pressure: 120}
      - {time: 60, oil_rate: 90, gas_rate: 0, water_rate: 0, pressure: 110}
  - {type: mid_pipe, name: manifold, pressure_drop: {type: constant, drop: 5}}
  - {type: end_pipe, name: north, outlet_pressure: 50}
  - {type: end_pipe, name: south, outlet_pressure: 50}
connections:
  - {from: P1, to: manifold}
  - {from: manifold, to: north, routing: split}
  - {from: manifold, to: south, routing: 0.4}
capacities:
  - {name: plant, feeds: [north, south], max_oil: 150}
"#;

    fn write_case(ext: &str, body: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(ext).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_yaml_and_builds_network() {
        let file = write_case(".yaml", CHAIN);
        let case = load_case_from_path(file.path()).unwrap();
        let network = build_network(&case).unwrap();
        let stats = network.stats();
        assert_eq!(stats.production_wells, 1);
        assert_eq!(stats.end_pipes, 2);
        assert_eq!(stats.connections, 3);
        assert_eq!(stats.free_variables, 1);
        assert_eq!(network.schedule.len(), 2);
    }

    #[test]
    fn unknown_extension_falls_back() {
        let file = write_case(".case", CHAIN);
        assert!(load_case_from_path(file.path()).is_ok());
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let body = CHAIN.replace("routing: split", "routing: missing");
        let case: CaseFile = serde_yaml::from_str(&body).unwrap();
        let err = build_network(&case).err().unwrap();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn well_stream_count_must_match_schedule() {
        let body = CHAIN.replace("schedule: [30, 60]", "schedule: [30, 60, 90]");
        let case: CaseFile = serde_yaml::from_str(&body).unwrap();
        assert!(build_network(&case).is_err());
    }

    #[test]
    fn field_streams_take_case_units() {
        let body = r#"
units: field
schedule: [10]
components:
  - type: production_well
    name: P1
    streams:
      - {time: 10, oil_rate: 100, pressure: 2000}
  - type: production_well
    name: P2
    streams:
      - {time: 10, oil_rate: 1, pressure: 1, units: metric}
  - {type: end_pipe, name: export, outlet_pressure: 50}
connections:
  - {from: P1, to: export}
  - {from: P2, to: export}
"#;
        let file = write_case(".yaml", body);
        let case = load_case_from_path(file.path()).unwrap();
        let network = build_network(&case).unwrap();

        let p1 = network.node(network.find("P1").unwrap()).streams()[0];
        assert_eq!(p1.units, UnitSystem::Field);
        assert_eq!(p1.oil_rate, 100.0);
        assert_eq!(p1.pressure, 2000.0);

        // an explicit unit system is still converted
        let p2 = network.node(network.find("P2").unwrap()).streams()[0];
        assert_eq!(p2.units, UnitSystem::Field);
        assert!((p2.oil_rate - 6.289811).abs() < 1e-6);
        assert!((p2.pressure - 14.5037738).abs() < 1e-6);
    }

    #[test]
    fn zero_perturbation_fraction_is_rejected() {
        let body = format!("{CHAIN}sensitivity: {{perturbation_fraction: 0.0}}\n");
        let case: CaseFile = serde_yaml::from_str(&body).unwrap();
        let err = load(&case).err().unwrap();
        assert!(format!("{err:#}").contains("perturbation fraction"));
    }

    #[test]
    fn load_resolves_adjoints() {
        let body = format!(
            "{CHAIN}adjoints:\n  - {{well: P1, time_index: 1, variable: split, d_oil: 2.0}}\n"
        );
        let case: CaseFile = serde_yaml::from_str(&body).unwrap();
        let loaded = load(&case).unwrap();
        assert_eq!(loaded.adjoints.len(), 1);
        let split = loaded.network.variables.by_name("split").unwrap().id;
        assert_eq!(loaded.adjoints.for_variable(split)[0].d_oil, 2.0);
    }
}
