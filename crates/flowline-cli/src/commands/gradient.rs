use std::path::Path;

use anyhow::Result;
use flowline_cli::case::{load, load_case_from_path};
use tracing::info;

pub fn handle(case_path: &Path, perturbation: Option<f64>, sequential: bool) -> Result<()> {
    let case = load_case_from_path(case_path)?;
    let mut loaded = load(&case)?;
    if let Some(fraction) = perturbation {
        loaded.engine.settings.perturbation_fraction = fraction;
        loaded.engine.settings.check()?;
    }
    if sequential {
        loaded.engine.settings.parallel = false;
    }

    let result = loaded.engine.run(&loaded.network, &loaded.adjoints)?;
    info!(
        objective = result.objective(),
        variables = result.objective_derivative().map_or(0, |d| d.len()),
        "gradient finished"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
