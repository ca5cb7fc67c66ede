use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flowline", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the network of a case file and report diagnostics
    Validate {
        /// Path to the case file (YAML or JSON)
        case: PathBuf,
    },
    /// Evaluate objective and constraints at the current variable values
    Evaluate {
        /// Path to the case file (YAML or JSON)
        case: PathBuf,
        /// Also print per-component streams
        #[arg(long)]
        streams: bool,
    },
    /// Evaluate and compute objective and constraint derivatives
    Gradient {
        /// Path to the case file (YAML or JSON)
        case: PathBuf,
        /// Override the perturbation fraction of the case file
        #[arg(long)]
        perturbation: Option<f64>,
        /// Evaluate perturbed cases sequentially
        #[arg(long)]
        sequential: bool,
    },
    /// Print the network topology
    Graph {
        /// Path to the case file (YAML or JSON)
        case: PathBuf,
        /// Output format (dot, graphviz)
        #[arg(long, default_value = "dot")]
        format: String,
        /// Optional output file path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
