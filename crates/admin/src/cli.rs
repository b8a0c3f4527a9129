use clap::{Parser, Subcommand};

use jobstate_infra::jobs::{SCHEMA_TYPE, SCHEMA_VERSION};

/// Maintenance for the job state schema version record.
///
/// Connection settings come from the `JOBSTATE_*` environment variables.
#[derive(Parser, Debug)]
#[command(name = "jobstate-admin")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Schema type the record is stored under
    #[arg(long, global = true, default_value = SCHEMA_TYPE)]
    pub schema_type: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the stored schema record
    Show,

    /// Compare the stored record with a codebase version
    Check {
        /// Codebase schema version to check against
        #[arg(long, default_value_t = SCHEMA_VERSION)]
        version: u32,

        /// Record the version or run the upgrade instead of only reporting
        #[arg(long)]
        commit: bool,
    },

    /// Overwrite the stored schema record
    Set {
        #[arg(long)]
        version: u32,

        /// Mark the schema as mid-upgrade
        #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
        in_update: bool,
    },
}
