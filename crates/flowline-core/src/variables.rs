//! Decision variables driven by the outer optimizer.
//!
//! Variables live in a [`VariableSet`] and are addressed by [`VarId`]. The id is
//! issued once when the variable is registered and travels with whatever
//! component owns it, so matching a variable to its component never depends on
//! global counters.

use crate::NodeIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn new(value: usize) -> Self {
        VarId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Continuous set point (control targets, routing fractions, booster settings, segment rates)
    Real,
    /// Discrete schedule index (install times)
    Integer,
    /// Discrete routing selection
    Binary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionVariable {
    pub id: VarId,
    pub name: String,
    pub kind: VariableKind,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    /// Component the variable belongs to, when it has one
    #[serde(skip)]
    pub owner: Option<NodeIndex>,
}

impl DecisionVariable {
    /// A variable is free to move only when its bounds differ.
    #[inline]
    pub fn is_variable(&self) -> bool {
        self.max != self.min
    }

    /// Real-valued variables are the ones the sensitivity engine differentiates.
    #[inline]
    pub fn is_continuous(&self) -> bool {
        self.kind == VariableKind::Real
    }

    /// Schedule index an install-time variable currently points at.
    #[inline]
    pub fn as_index(&self) -> usize {
        self.value.round().max(0.0) as usize
    }
}

/// Arena of decision variables.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    vars: Vec<DecisionVariable>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable and return its id.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        kind: VariableKind,
        value: f64,
        min: f64,
        max: f64,
    ) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(DecisionVariable {
            id,
            name: name.into(),
            kind,
            value,
            min,
            max,
            owner: None,
        });
        id
    }

    /// Real variable pinned at `value` (`min == max`).
    pub fn add_fixed(&mut self, name: impl Into<String>, value: f64) -> VarId {
        self.add(name, VariableKind::Real, value, value, value)
    }

    pub fn get(&self, id: VarId) -> Option<&DecisionVariable> {
        self.vars.get(id.0)
    }

    pub fn get_mut(&mut self, id: VarId) -> Option<&mut DecisionVariable> {
        self.vars.get_mut(id.0)
    }

    /// Current value, 0.0 for an id this set never issued.
    #[inline]
    pub fn value(&self, id: VarId) -> f64 {
        self.vars.get(id.0).map_or(0.0, |v| v.value)
    }

    /// Returns `false` when the id is unknown.
    pub fn set_value(&mut self, id: VarId, value: f64) -> bool {
        match self.vars.get_mut(id.0) {
            Some(var) => {
                var.value = value;
                true
            }
            None => false,
        }
    }

    pub fn set_owner(&mut self, id: VarId, owner: NodeIndex) {
        if let Some(var) = self.vars.get_mut(id.0) {
            var.owner = Some(owner);
        }
    }

    /// Whether an optional install-time variable permits operation at `index`.
    pub fn is_installed(&self, install_time: Option<VarId>, index: usize) -> bool {
        match install_time.and_then(|id| self.get(id)) {
            Some(var) => index >= var.as_index(),
            None => true,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecisionVariable> {
        self.vars.iter()
    }

    /// Real variables in id order.
    pub fn continuous(&self) -> impl Iterator<Item = &DecisionVariable> {
        self.vars.iter().filter(|v| v.is_continuous())
    }

    pub fn by_name(&self, name: &str) -> Option<&DecisionVariable> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
