//! # flowline-algo: Network Evaluation and Sensitivities
//!
//! Evaluates a [`flowline_core::Network`] under its current decision-variable
//! assignment and differentiates the result.
//!
//! ## Evaluation pipeline
//!
//! | Stage | Module | Direction |
//! |-------|--------|-----------|
//! | Stream propagation | [`formulation`] | wells to terminal pipes |
//! | Inlet pressures | [`pressure`] | terminal pipes to wells |
//! | Constraints | [`constraints`] | per component, per schedule index |
//! | Objective | [`objective`] | reduction over well streams and costs |
//!
//! [`Evaluator`] runs the stages in order. [`SensitivityEngine`] repeats the
//! evaluation once per perturbed variable on independent network copies and
//! assembles a [`Case`] with derivatives.
//!
//! ### Formulations
//!
//! - [`CoupledModel`]: direct superposition, mass balance exact by construction
//! - [`DecoupledModel`]: explicit segment rate variables plus material-balance
//!   equality constraints
//!
//! ## Example
//!
//! ```rust
//! use flowline_algo::{CoupledModel, CumulativeOil, Evaluator};
//! use flowline_core::*;
//! use std::sync::Arc;
//!
//! let mut network = Network::new(UnitSystem::Metric);
//! let well = network.add_node(Node::Well(Well::production("P1")));
//! let export = network.add_node(Node::EndPipe(EndPipe::new("export", 50.0, UnitSystem::Metric)));
//! network.connect_fixed(well, export, 1.0);
//! network.initialize(Schedule::new(vec![30.0]).unwrap()).unwrap();
//! network
//!     .set_well_streams(well, vec![Stream::new(30.0, 100.0, 0.0, 0.0, 120.0)])
//!     .unwrap();
//!
//! let evaluator = Evaluator::new(Arc::new(CoupledModel), Arc::new(CumulativeOil));
//! let result = evaluator.evaluate(&mut network).unwrap();
//! assert_eq!(result.objective, 3000.0);
//! ```

pub mod constraints;
pub mod evaluate;
pub mod formulation;
pub mod objective;
pub mod pressure;
pub mod registry;
pub mod sensitivity;

pub use constraints::{Constraint, ConstraintId, ConstraintKind, ConstraintSet};
pub use evaluate::{Evaluation, Evaluator};
pub use formulation::{CoupledModel, DecoupledModel, Formulation};
pub use objective::{CumulativeGas, CumulativeOil, Npv, Objective, WellSeries};
pub use pressure::solve_pressures;
pub use registry::{FormulationKind, ObjectiveSpec, DEFAULT_MAX_RATE};
pub use sensitivity::{
    AdjointRecord, AdjointTable, Case, Derivatives, SensitivityEngine, SensitivitySettings,
};
