//! Machine-readable summary.json.
//!
//! One document per run: schema version, exit code, status counts and the
//! full ordered per-case records. Downstream tooling branches on
//! `schema_version` before reading anything else.

use super::{RunArtifacts, StatusCounts};
use crate::model::CaseOutcome;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current schema version for summary.json.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub schema_version: u32,
    /// 0 all passed, 1 failures or infrastructure errors.
    pub exit_code: i32,
    pub duration_ms: u64,
    pub results: StatusCounts,
    /// Per-case records in execution order.
    pub cases: Vec<CaseOutcome>,
}

impl Summary {
    pub fn from_run(arts: &RunArtifacts) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            exit_code: if arts.any_failed() { 1 } else { 0 },
            duration_ms: arts.duration_ms,
            results: arts.counts(),
            cases: arts.outcomes.clone(),
        }
    }
}

/// Write summary.json to `out`.
pub fn write_summary(summary: &Summary, out: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(out, json)?;
    Ok(())
}
