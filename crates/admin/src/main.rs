//! jobstate-admin - maintenance CLI for the job state database.

use anyhow::{Context, Result};
use clap::Parser;

use jobstate_infra::JobStateConfig;
use jobstate_infra::bootstrap::{connect_pool, open_schema_manager};

mod cli;
mod commands;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    jobstate_observability::init();

    let config = JobStateConfig::from_env().context("invalid configuration")?;
    let pool = connect_pool(&config).await?;
    let schema = open_schema_manager(&pool).await?;
    tracing::debug!(schema_type = %cli.schema_type, command = ?cli.command, "running admin command");

    match cli.command {
        Command::Show => commands::show(&schema, &cli.schema_type).await,
        Command::Check { version, commit } => {
            commands::check(&schema, &cli.schema_type, version, commit).await
        }
        Command::Set { version, in_update } => {
            commands::set(&schema, &cli.schema_type, version, in_update).await
        }
    }
}
