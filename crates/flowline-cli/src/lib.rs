pub mod case;
pub mod cli;

pub use case::{build_network, load, load_case_from_path, CaseFile, LoadedCase};
pub use cli::{Cli, Commands};
