use std::path::Path;

use anyhow::{bail, Result};
use flowline_cli::case::{build_network, load_case_from_path};
use flowline_core::Diagnostics;
use tracing::info;

pub fn handle(case_path: &Path) -> Result<()> {
    let case = load_case_from_path(case_path)?;
    let network = build_network(&case)?;
    let mut diag = Diagnostics::new();
    network.validate_into(&mut diag);

    println!("Network {}:", case_path.display());
    println!("  {}", network.stats());
    println!("  Periods       : {}", network.schedule.len());
    println!("  Variables     : {}", network.variables.len());
    for issue in diag.errors().chain(diag.warnings()) {
        println!("  {issue}");
    }
    info!(summary = %diag.summary(), "validation finished");

    if diag.has_errors() {
        bail!("{} validation error(s)", diag.error_count());
    }
    Ok(())
}
