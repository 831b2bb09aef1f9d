// Entrypoint for the self-enrollment tool.
// - Keeps `main` small: resolve settings, set up logging, run the flow.
// - Any error is logged and turned into a non-zero exit status.

use anyhow::Context;
use delphix_self_enroll::{cli::Cli, enroll};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(mut cli: Cli) -> anyhow::Result<()> {
    let file = cli.file_config().context("loading config file")?;
    cli.prompt_password_if_missing(&file)?;
    let settings = cli.into_settings(file)?;
    tracing::debug!(?settings, "resolved settings");

    match enroll::run(&settings).context("self-enrollment failed")? {
        enroll::Outcome::AlreadyExists(env) => {
            info!(reference = %env.reference, "environment {} was already registered", env.name)
        }
        enroll::Outcome::Created { reference, job } => {
            info!(?reference, ?job, "environment created")
        }
    }
    info!("Complete");
    Ok(())
}

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbosity());

    if let Err(err) = run(cli) {
        error!("{err:#}");
        std::process::exit(1);
    }
}
