pub mod console;
pub mod progress;
pub mod summary;
pub mod table;

use crate::model::{CaseOutcome, CaseStatus};
use serde::{Deserialize, Serialize};

/// Everything a finished run produced, in case order.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub outcomes: Vec<CaseOutcome>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub total: usize,
}

impl RunArtifacts {
    pub fn counts(&self) -> StatusCounts {
        let mut c = StatusCounts::default();
        for o in &self.outcomes {
            match o.status {
                CaseStatus::Pass => c.passed += 1,
                CaseStatus::Fail => c.failed += 1,
                CaseStatus::Skip => c.skipped += 1,
                CaseStatus::Error => c.errored += 1,
            }
            c.total += 1;
        }
        c
    }

    /// True when any case failed or hit an infrastructure error.
    pub fn any_failed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.status, CaseStatus::Fail | CaseStatus::Error))
    }
}
