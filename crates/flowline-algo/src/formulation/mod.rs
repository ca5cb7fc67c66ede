//! Propagation formulations.
//!
//! A formulation fills the pipe, separator and booster streams from the
//! current well streams and variable assignment, and may add constraints of
//! its own. Pressure solving and the shared constraint groups run afterwards
//! and are the same for every formulation.

mod coupled;
mod decoupled;

pub use coupled::CoupledModel;
pub use decoupled::{DecoupledModel, SegmentRates};

use crate::constraints::ConstraintSet;
use flowline_core::{Diagnostics, FlowResult, Network};

/// Defines how segment streams are populated (what is consistent by
/// construction and what is left to constraints).
pub trait Formulation: Send + Sync + std::fmt::Debug {
    /// Unique identifier ("coupled", "decoupled")
    fn id(&self) -> &str;

    /// Populate segment streams. Streams must already be emptied.
    fn propagate(&self, network: &mut Network, diag: &mut Diagnostics) -> FlowResult<()>;

    /// Constraints owned by this formulation, appended after the shared groups.
    fn append_constraints(&self, _network: &Network, _set: &mut ConstraintSet) -> FlowResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formulation_is_object_safe() {
        fn _accepts(_f: &dyn Formulation) {}
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Box<dyn Formulation>>();
    }
}
