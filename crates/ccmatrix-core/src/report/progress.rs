//! Progress reporting. The runner emits done/total after each case; the
//! console layer consumes via a sink.

use crate::model::CaseStatus;
use std::sync::Arc;

/// One progress update, emitted after a case completes.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
    pub test_name: String,
    pub compiler_display: String,
    pub status: CaseStatus,
}

/// Sink for progress events. Implementations may throttle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
