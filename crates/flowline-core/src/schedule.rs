use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};

/// Strictly increasing list of report times (days) shared by every component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    times: Vec<f64>,
}

impl Schedule {
    pub fn new(times: Vec<f64>) -> FlowResult<Self> {
        if times.is_empty() {
            return Err(FlowError::Validation("schedule has no entries".into()));
        }
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(FlowError::Validation(
                "schedule times must be strictly increasing".into(),
            ));
        }
        Ok(Self { times })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn time(&self, index: usize) -> Option<f64> {
        self.times.get(index).copied()
    }

    /// Length of the period ending at `index`; the first period starts at zero.
    pub fn dt(&self, index: usize) -> f64 {
        match index {
            0 => self.times.first().copied().unwrap_or(0.0),
            i => match (self.times.get(i), self.times.get(i - 1)) {
                (Some(end), Some(start)) => end - start,
                _ => 0.0,
            },
        }
    }
}
