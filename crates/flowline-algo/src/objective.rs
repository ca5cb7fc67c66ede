//! Objective evaluators.
//!
//! Objectives are pure reducers over well stream series and cost events. They
//! never see the topology.

use flowline_core::{CostEvent, Network, Stream, WellKind};
use serde::{Deserialize, Serialize};

const DAYS_PER_YEAR: f64 = 365.0;

/// Stream history of one well as seen by an objective.
///
/// Periods before the well is installed hold zero rates.
#[derive(Debug, Clone, Serialize)]
pub struct WellSeries {
    pub name: String,
    pub kind: WellKind,
    pub streams: Vec<Stream>,
}

impl WellSeries {
    /// Collect the series of every well in `network`.
    pub fn collect(network: &Network) -> Vec<WellSeries> {
        network
            .wells()
            .filter_map(|idx| {
                let well = network.node(idx).as_well()?;
                let streams = well
                    .streams
                    .iter()
                    .enumerate()
                    .map(|(t, s)| {
                        if network.is_installed(idx, t) {
                            *s
                        } else {
                            s.zeroed()
                        }
                    })
                    .collect();
                Some(WellSeries {
                    name: well.name.clone(),
                    kind: well.kind,
                    streams,
                })
            })
            .collect()
    }

    /// (period length, stream) pairs; the first period starts at time zero.
    pub fn periods(&self) -> impl Iterator<Item = (f64, &Stream)> + '_ {
        let mut previous = 0.0;
        self.streams.iter().map(move |s| {
            let dt = s.time - previous;
            previous = s.time;
            (dt, s)
        })
    }
}

/// Turns well streams and cost events into the scalar being optimized.
pub trait Objective: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn value(&self, wells: &[WellSeries], costs: &[CostEvent]) -> f64;
}

/// Total oil produced over the schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct CumulativeOil;

impl Objective for CumulativeOil {
    fn name(&self) -> &str {
        "cumulative_oil"
    }

    fn value(&self, wells: &[WellSeries], _costs: &[CostEvent]) -> f64 {
        cumulative(wells, |s| s.oil_rate)
    }
}

/// Total gas produced over the schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct CumulativeGas;

impl Objective for CumulativeGas {
    fn name(&self) -> &str {
        "cumulative_gas"
    }

    fn value(&self, wells: &[WellSeries], _costs: &[CostEvent]) -> f64 {
        cumulative(wells, |s| s.gas_rate)
    }
}

fn cumulative(wells: &[WellSeries], rate: impl Fn(&Stream) -> f64) -> f64 {
    wells
        .iter()
        .filter(|w| w.kind == WellKind::Production)
        .flat_map(|w| w.periods())
        .map(|(dt, s)| rate(s) * dt)
        .sum()
}

/// Discounted cash flow.
///
/// Each period earns oil and gas revenue, pays for produced water and for
/// injected volumes, and is discounted annually at `discount_rate` from its
/// end time. Cost events are discounted the same way and subtracted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Npv {
    #[serde(default)]
    pub oil_price: f64,
    #[serde(default)]
    pub gas_price: f64,
    /// Cost per unit of produced water
    #[serde(default)]
    pub water_price: f64,
    /// Cost per unit of injected water or gas
    #[serde(default)]
    pub injection_price: f64,
    #[serde(default)]
    pub discount_rate: f64,
}

impl Npv {
    fn discount(&self, time: f64) -> f64 {
        (1.0 + self.discount_rate).powf(-time / DAYS_PER_YEAR)
    }
}

impl Default for Npv {
    fn default() -> Self {
        Self {
            oil_price: 60.0,
            gas_price: 0.0,
            water_price: 0.0,
            injection_price: 0.0,
            discount_rate: 0.1,
        }
    }
}

impl Objective for Npv {
    fn name(&self) -> &str {
        "npv"
    }

    fn value(&self, wells: &[WellSeries], costs: &[CostEvent]) -> f64 {
        let mut npv = 0.0;
        for well in wells {
            for (dt, s) in well.periods() {
                let cash = match well.kind {
                    WellKind::Production => {
                        self.oil_price * s.oil_rate + self.gas_price * s.gas_rate
                            - self.water_price * s.water_rate
                    }
                    WellKind::Injection => -self.injection_price * (s.water_rate + s.gas_rate),
                };
                npv += cash * dt * self.discount(s.time);
            }
        }
        let capex: f64 = costs
            .iter()
            .map(|c| c.amount * self.discount(c.time))
            .sum();
        npv - capex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(kind: WellKind, rates: &[(f64, f64)]) -> WellSeries {
        WellSeries {
            name: "w".into(),
            kind,
            streams: rates
                .iter()
                .map(|&(t, q)| Stream::new(t, q, 2.0 * q, q, 0.0))
                .collect(),
        }
    }

    #[test]
    fn test_cumulative_oil_uses_period_lengths() {
        let wells = vec![series(WellKind::Production, &[(10.0, 5.0), (30.0, 1.0)])];
        assert_eq!(CumulativeOil.value(&wells, &[]), 70.0);
        assert_eq!(CumulativeGas.value(&wells, &[]), 140.0);
    }

    #[test]
    fn test_injectors_do_not_count_as_production() {
        let wells = vec![series(WellKind::Injection, &[(10.0, 5.0)])];
        assert_eq!(CumulativeOil.value(&wells, &[]), 0.0);
    }

    #[test]
    fn test_npv_undiscounted() {
        let npv = Npv {
            oil_price: 10.0,
            gas_price: 0.0,
            water_price: 1.0,
            injection_price: 2.0,
            discount_rate: 0.0,
        };
        let wells = vec![
            series(WellKind::Production, &[(10.0, 5.0)]),
            series(WellKind::Injection, &[(10.0, 1.0)]),
        ];
        let costs = vec![CostEvent {
            time: 10.0,
            amount: 100.0,
            source: "pump".into(),
        }];
        // (50 - 5) * 10 - (2 * 3) * 10 - 100
        assert!((npv.value(&wells, &costs) - 290.0).abs() < 1e-9);
    }

    #[test]
    fn test_npv_discounts_late_costs() {
        let npv = Npv {
            discount_rate: 0.1,
            ..Npv::default()
        };
        let early = [CostEvent {
            time: 0.0,
            amount: 100.0,
            source: "a".into(),
        }];
        let late = [CostEvent {
            time: 365.0,
            amount: 100.0,
            source: "a".into(),
        }];
        assert!((npv.value(&[], &early) + 100.0).abs() < 1e-9);
        assert!((npv.value(&[], &late) + 100.0 / 1.1).abs() < 1e-9);
    }
}
