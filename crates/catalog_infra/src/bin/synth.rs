use std::path::PathBuf;

use anyhow::Context;
use catalog_infra::{compose, AppSettings, DeployEnv, RepositorySettings};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Synthesize the catalog stacks into CloudFormation templates.
#[derive(Parser)]
#[command(name = "synth")]
struct Cli {
    /// Target account id
    #[arg(long, env = "AWS_ACCOUNT")]
    account: String,
    /// Target region
    #[arg(long, env = "AWS_REGIONS")]
    region: String,
    /// Owner of the source repository watched by the pipeline
    #[arg(long, env = "REPO_OWNER")]
    repo_owner: String,
    /// Name of the source repository watched by the pipeline
    #[arg(long, env = "REPO_NAME")]
    repo_name: String,
    /// Branch that triggers the pipeline
    #[arg(long, default_value = catalog_infra::config::DEFAULT_BRANCH)]
    branch: String,
    #[arg(long, default_value = catalog_infra::config::DEFAULT_API_NAME)]
    api_name: String,
    #[arg(long, default_value = catalog_infra::config::DEFAULT_TABLE_NAME)]
    table_name: String,
    #[arg(long)]
    api_description: Option<String>,
    /// Output directory for templates, manifest and staged assets
    #[arg(long, default_value = "cdk.out")]
    out: PathBuf,
    /// Shared utility layer source directory
    #[arg(long, default_value = "layers/utils")]
    layer_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CATALOG_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut repository = RepositorySettings::new(cli.repo_owner, cli.repo_name);
    repository.branch = cli.branch;
    let mut settings = AppSettings::new(DeployEnv::new(cli.account, cli.region), repository);
    settings.api_name = cli.api_name;
    settings.table_name = cli.table_name;
    settings.api_description = cli.api_description;

    let app = compose(&settings, &cli.layer_dir, &cli.out).context("failed to compose app")?;
    let assembly = app
        .synth(&cli.out)
        .with_context(|| format!("failed to synthesize into {}", cli.out.display()))?;

    info!(
        out = %assembly.out_dir.display(),
        order = ?assembly.manifest.deploy_order,
        "synthesis complete"
    );
    Ok(())
}
