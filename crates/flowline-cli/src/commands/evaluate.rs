use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use flowline_cli::case::{load, load_case_from_path};
use flowline_core::Stream;
use serde_json::json;
use tracing::{info, warn};

pub fn handle(case_path: &Path, streams: bool) -> Result<()> {
    let case = load_case_from_path(case_path)?;
    let mut loaded = load(&case)?;
    let evaluation = loaded.engine.evaluator.evaluate(&mut loaded.network)?;

    let infeasible = evaluation
        .constraints
        .iter()
        .filter(|c| !c.is_feasible(1e-9))
        .count();
    if infeasible > 0 {
        warn!(infeasible, "case violates constraints");
    }
    info!(
        objective = evaluation.objective,
        constraints = evaluation.constraints.len(),
        "evaluation finished"
    );

    let mut payload = json!({
        "objective": evaluation.objective,
        "total_violation": evaluation.constraints.total_violation(),
        "constraints": evaluation.constraints,
        "diagnostics": evaluation.diagnostics,
    });
    if streams {
        let per_node: BTreeMap<&str, &[Stream]> = loaded
            .network
            .graph
            .node_weights()
            .map(|node| (node.label(), node.streams()))
            .collect();
        payload["streams"] = serde_json::to_value(per_node)?;
    }
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
