use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repo_vacuum::git::HostKeyPolicy;
use repo_vacuum::shutdown::{self, cancel_on_ctrl_c};
use repo_vacuum::{build_provider, build_sink, Config, OutputKind, Overrides, ProviderKind, Vacuum};

#[derive(Parser)]
#[command(name = "repo-vacuum")]
#[command(about = "Clone or list every repository of GitHub/GitLab organizations and users")]
#[command(version)]
struct Cli {
    /// Hosting platform
    #[arg(long, value_enum)]
    provider: Option<ProviderKind>,

    /// API base URL (GitHub Enterprise, self-hosted GitLab)
    #[arg(long)]
    provider_endpoint: Option<String>,

    /// Personal access token
    #[arg(long, env = "VACUUM_ACCESS_TOKEN", hide_env_values = true)]
    provider_access_token: Option<String>,

    /// Output strategy
    #[arg(long, value_enum)]
    output: Option<OutputKind>,

    /// Root folder for cloned repositories
    #[arg(long)]
    output_folder: Option<String>,

    /// Private key used for SSH clones
    #[arg(long)]
    ssh_key: Option<String>,

    /// Host key verification for SSH clones
    #[arg(long, value_enum)]
    host_key_policy: Option<HostKeyPolicy>,

    /// Organization to vacuum (repeatable); all visible ones when no --org and no --user
    #[arg(long = "org")]
    orgs: Vec<String>,

    /// User to vacuum (repeatable)
    #[arg(long = "user")]
    users: Vec<String>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            provider: self.provider,
            endpoint: self.provider_endpoint.clone(),
            access_token: self.provider_access_token.clone(),
            output: self.output,
            folder: self.output_folder.clone(),
            ssh_key: self.ssh_key.clone(),
            host_key_policy: self.host_key_policy,
            organizations: self.orgs.clone(),
            users: self.users.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    config.apply(cli.overrides())?;

    init_logging(cli.verbose, &config.logging.level);

    let kind = config.validate()?;

    let (trigger, shutdown) = shutdown::channel();
    cancel_on_ctrl_c(trigger);

    let provider = build_provider(kind, config.provider_options(shutdown))
        .with_context(|| format!("Failed to set up {} provider", kind.as_str()))?;
    let sink = build_sink(config.output.kind, config.sink_options());

    info!("Starting {} vacuum", provider.name());
    let report = Vacuum::new(provider, sink).run(&config.targets).await;

    match report.errors.into_result() {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(failed) => {
            error!("{} error(s) during run", failed.errors.len());
            eprintln!("{}", failed);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Initialize logging to stderr, keeping stdout free for the manifest
fn init_logging(verbose: bool, default_level: &str) {
    let fallback = if verbose { "debug" } else { default_level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
