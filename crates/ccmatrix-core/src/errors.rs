//! Stage-tagged error model shared by every backend.
//!
//! Remote and local backends fail for structurally different reasons (HTTP
//! transport vs. process exit codes); both map into [`StageError`] so the
//! orchestrator composes them identically. Expected compiler/runtime
//! diagnostics travel as values, never as panics.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// One pipeline step. Every error is tagged with the stage that produced it
/// so reporting can distinguish harness faults from compiler-under-test
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preprocess,
    Compile,
    Assemble,
    Link,
    Execute,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Preprocess => "preprocess",
            Stage::Compile => "compile",
            Stage::Assemble => "assemble",
            Stage::Link => "link",
            Stage::Execute => "execute",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Remote network/HTTP failure. Infrastructure.
    #[serde(rename = "transport-error")]
    Transport,
    /// Remote service rejected or mangled the request. Infrastructure.
    #[serde(rename = "api-error")]
    Api,
    /// The compiler under test reported a build failure. A reportable test
    /// outcome, never a harness fault.
    CompilerDiagnostic,
    /// The produced program crashed or exited with an unexpected status.
    RuntimeDiagnostic,
    /// Auto-detection could not pick a variant.
    VariantUnresolved,
    /// Configured local tool not found or not invocable. Infrastructure.
    LocalToolMissing,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport-error",
            ErrorKind::Api => "api-error",
            ErrorKind::CompilerDiagnostic => "compiler-diagnostic",
            ErrorKind::RuntimeDiagnostic => "runtime-diagnostic",
            ErrorKind::VariantUnresolved => "variant-unresolved",
            ErrorKind::LocalToolMissing => "local-tool-missing",
        }
    }

    /// Infrastructure errors mark the case `error` and let the run proceed;
    /// diagnostic errors are first-class test outcomes.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::Api | ErrorKind::LocalToolMissing
        )
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure descriptor threaded through every pipeline stage.
///
/// The raw diagnostic payload (compiler stderr, API body) is preserved in
/// `detail` for inspection rather than summarized away.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{stage} {kind}: {message}")]
pub struct StageError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageError {
    pub fn new(stage: Stage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn transport(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, ErrorKind::Transport, message)
    }

    pub fn api(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, ErrorKind::Api, message)
    }

    pub fn compiler_diagnostic(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, ErrorKind::CompilerDiagnostic, message)
    }

    pub fn runtime_diagnostic(message: impl Into<String>) -> Self {
        Self::new(Stage::Execute, ErrorKind::RuntimeDiagnostic, message)
    }

    pub fn variant_unresolved(message: impl Into<String>) -> Self {
        Self::new(Stage::Preprocess, ErrorKind::VariantUnresolved, message)
    }

    pub fn local_tool_missing(stage: Stage, tool: &str) -> Self {
        Self::new(
            stage,
            ErrorKind::LocalToolMissing,
            format!("local tool not found: {tool}"),
        )
    }
}

/// Result alias for pipeline stages. `std::result::Result` already provides
/// the `map`/`and_then` short-circuit contract the engine relies on.
pub type StageResult<T> = Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_kinds_are_classified() {
        assert!(ErrorKind::Transport.is_infrastructure());
        assert!(ErrorKind::Api.is_infrastructure());
        assert!(ErrorKind::LocalToolMissing.is_infrastructure());
        assert!(!ErrorKind::CompilerDiagnostic.is_infrastructure());
        assert!(!ErrorKind::RuntimeDiagnostic.is_infrastructure());
        assert!(!ErrorKind::VariantUnresolved.is_infrastructure());
    }

    #[test]
    fn kind_serializes_to_taxonomy_names() {
        let json = serde_json::to_string(&ErrorKind::Transport).unwrap();
        assert_eq!(json, "\"transport-error\"");
        let json = serde_json::to_string(&ErrorKind::CompilerDiagnostic).unwrap();
        assert_eq!(json, "\"compiler-diagnostic\"");
        let json = serde_json::to_string(&ErrorKind::VariantUnresolved).unwrap();
        assert_eq!(json, "\"variant-unresolved\"");
    }

    #[test]
    fn stage_error_display_carries_stage_and_kind() {
        let err = StageError::compiler_diagnostic(Stage::Compile, "syntax error")
            .with_detail("line 3: expected ';'");
        assert_eq!(err.to_string(), "compile compiler-diagnostic: syntax error");
        assert_eq!(err.detail.as_deref(), Some("line 3: expected ';'"));
    }
}
