//! Subcommand handlers.

use std::fmt;

use anyhow::{Context, Result};

use jobstate_infra::SchemaManager;
use jobstate_infra::schema::SchemaRecord;

/// What `check_and_upgrade` would do against the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckPlan {
    /// No record yet; the first start records the codebase version.
    Record { version: u32 },
    UpToDate { version: u32 },
    Upgrade { from: u32, to: u32 },
    /// The database is newer than the codebase.
    Incompatible { codebase: u32, database: u32 },
    UpdateInProgress { version: u32 },
}

impl CheckPlan {
    pub fn for_record(record: Option<&SchemaRecord>, codebase: u32) -> Self {
        let Some(record) = record else {
            return CheckPlan::Record { version: codebase };
        };
        if record.version > codebase {
            CheckPlan::Incompatible {
                codebase,
                database: record.version,
            }
        } else if record.in_update {
            CheckPlan::UpdateInProgress {
                version: record.version,
            }
        } else if record.version == codebase {
            CheckPlan::UpToDate { version: codebase }
        } else {
            CheckPlan::Upgrade {
                from: record.version,
                to: codebase,
            }
        }
    }

    /// Whether starting the service would pass the gate without changes.
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckPlan::UpToDate { .. })
    }
}

impl fmt::Display for CheckPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckPlan::Record { version } => write!(f, "no schema record; v{version} would be recorded"),
            CheckPlan::UpToDate { version } => write!(f, "schema is up to date at v{version}"),
            CheckPlan::Upgrade { from, to } => write!(f, "schema would be upgraded from v{from} to v{to}"),
            CheckPlan::Incompatible { codebase, database } => write!(
                f,
                "incompatible database schema: codebase is v{codebase}, database is v{database}"
            ),
            CheckPlan::UpdateInProgress { version } => {
                write!(f, "an update from v{version} is in progress")
            }
        }
    }
}

pub async fn show(schema: &SchemaManager, schema_type: &str) -> Result<()> {
    match schema.get_record(schema_type).await? {
        Some(record) => println!(
            "{}",
            serde_json::to_string_pretty(&record).context("failed to render schema record")?
        ),
        None => println!("no schema record for {schema_type}"),
    }
    Ok(())
}

pub async fn check(
    schema: &SchemaManager,
    schema_type: &str,
    version: u32,
    commit: bool,
) -> Result<()> {
    let record = schema.get_record(schema_type).await?;
    let plan = CheckPlan::for_record(record.as_ref(), version);
    println!("{plan}");

    if !commit {
        if !plan.is_ok() {
            println!("dry run; pass --commit to apply");
        }
        return Ok(());
    }
    schema
        .check_and_upgrade(schema_type, version)
        .await
        .with_context(|| format!("schema check for {schema_type} v{version} failed"))?;
    println!("ok");
    Ok(())
}

pub async fn set(
    schema: &SchemaManager,
    schema_type: &str,
    version: u32,
    in_update: bool,
) -> Result<()> {
    schema.set_record(schema_type, version, in_update).await?;
    show(schema, schema_type).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_follow_the_gate_order() {
        let rec = |version, in_update| SchemaRecord::new("jobstate", version, in_update);

        assert_eq!(CheckPlan::for_record(None, 2), CheckPlan::Record { version: 2 });
        assert_eq!(
            CheckPlan::for_record(Some(&rec(2, false)), 2),
            CheckPlan::UpToDate { version: 2 }
        );
        assert_eq!(
            CheckPlan::for_record(Some(&rec(1, false)), 2),
            CheckPlan::Upgrade { from: 1, to: 2 }
        );
        // A newer database wins over an in-progress flag.
        assert_eq!(
            CheckPlan::for_record(Some(&rec(3, true)), 2),
            CheckPlan::Incompatible {
                codebase: 2,
                database: 3
            }
        );
        assert_eq!(
            CheckPlan::for_record(Some(&rec(2, true)), 2),
            CheckPlan::UpdateInProgress { version: 2 }
        );
    }

    #[test]
    fn only_up_to_date_is_ok() {
        assert!(CheckPlan::UpToDate { version: 1 }.is_ok());
        assert!(!CheckPlan::Record { version: 1 }.is_ok());
    }
}
