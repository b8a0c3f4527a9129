use serde::{Deserialize, Serialize};

/// How a job reports progress. Fixed when the job is started.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressType {
    None,
    Task,
    Percent,
}

impl ProgressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressType::None => "none",
            ProgressType::Task => "task",
            ProgressType::Percent => "percent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ProgressType::None),
            "task" => Some(ProgressType::Task),
            "percent" => Some(ProgressType::Percent),
            _ => None,
        }
    }
}

impl core::fmt::Display for ProgressType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress mode requested when starting a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProgressSpec {
    /// No progress is reported.
    None,
    /// Progress counts completed tasks out of `max` (must be > 0).
    Task { max: u32 },
    /// Progress is a percentage; the maximum is fixed at 100.
    Percent,
}

impl ProgressSpec {
    pub const PERCENT_MAX: u32 = 100;

    pub fn progress_type(&self) -> ProgressType {
        match self {
            ProgressSpec::None => ProgressType::None,
            ProgressSpec::Task { .. } => ProgressType::Task,
            ProgressSpec::Percent => ProgressType::Percent,
        }
    }

    /// Maximum progress to persist at start.
    pub fn max(&self) -> Option<u32> {
        match self {
            ProgressSpec::None => None,
            ProgressSpec::Task { max } => Some(*max),
            ProgressSpec::Percent => Some(Self::PERCENT_MAX),
        }
    }
}
