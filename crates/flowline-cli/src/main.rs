use clap::Parser;
use flowline_cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {err}");
    }

    let result = match &cli.command {
        Commands::Validate { case } => commands::validate::handle(case),
        Commands::Evaluate { case, streams } => commands::evaluate::handle(case, *streams),
        Commands::Gradient {
            case,
            perturbation,
            sequential,
        } => commands::gradient::handle(case, *perturbation, *sequential),
        Commands::Graph { case, format, out } => {
            commands::graph::handle(case, format, out.as_deref())
        }
    };

    if let Err(err) = result {
        error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
