//! Console progress sink: one line per completed case on stderr.

use super::progress::{ProgressEvent, ProgressSink};
use crate::model::CaseStatus;
use std::sync::Arc;

fn status_mark(status: CaseStatus) -> &'static str {
    match status {
        CaseStatus::Pass => "PASS",
        CaseStatus::Fail => "FAIL",
        CaseStatus::Skip => "SKIP",
        CaseStatus::Error => "ERROR",
    }
}

pub fn stderr_sink() -> ProgressSink {
    Arc::new(|ev: ProgressEvent| {
        eprintln!(
            "[{}/{}] {:<5} {} [{}]",
            ev.done,
            ev.total,
            status_mark(ev.status),
            ev.test_name,
            ev.compiler_display
        );
    })
}
