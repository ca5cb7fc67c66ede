use std::fs;
use std::path::Path;

use anyhow::Result;
use flowline_cli::case::{build_network, load_case_from_path};
use flowline_core::graph_utils;

pub fn handle(case_path: &Path, format: &str, out: Option<&Path>) -> Result<()> {
    let case = load_case_from_path(case_path)?;
    let network = build_network(&case)?;
    let dot = graph_utils::export_graph(&network, format)?;
    if let Some(path) = out {
        fs::write(path, &dot)?;
        println!("Graph exported to {}", path.display());
    } else {
        println!("{dot}");
    }
    Ok(())
}
