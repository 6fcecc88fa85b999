//! Execution backends.
//!
//! A backend is one execution substrate (remote API or local toolchain)
//! offering the same three capabilities: preprocess, compile-or-assemble,
//! execute. The orchestrator selects one implementation per compiler
//! configuration and never branches on backend type afterwards.

pub mod fake;
pub mod local;
pub mod remote;

use crate::errors::StageResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Source text plus everything a backend needs to act on it.
#[derive(Debug, Clone, Default)]
pub struct SourceUnit {
    pub source: String,
    /// Additional files (headers etc.) as (name, contents).
    pub files: Vec<(String, String)>,
    /// Space-joined compiler flags.
    pub compiler_args: String,
    pub language: String,
    /// Piped to the program's standard input at the execute stage.
    pub stdin: String,
    /// Arguments passed to the program at the execute stage.
    pub run_args: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PreprocessOutput {
    pub text: String,
    /// Compiler diagnostics emitted during preprocessing.
    pub compiler_stderr: String,
    pub has_warnings: bool,
    pub raw: Option<serde_json::Value>,
}

/// Where the built program lives, if anywhere tangible.
#[derive(Debug, Clone)]
pub enum BinaryRef {
    /// The remote service builds and runs in one request; there is no
    /// addressable artifact on our side.
    Remote,
    /// A locally produced executable. The scratch directory is kept alive
    /// for as long as the reference exists.
    Local {
        path: PathBuf,
        workdir: Arc<TempDir>,
    },
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Assembly text, when this mode produces it.
    pub assembly: Option<String>,
    pub binary: BinaryRef,
    pub compiler_stderr: String,
    pub has_warnings: bool,
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Build diagnostics reported alongside execution (remote mode bundles
    /// the build into the execute request).
    pub compiler_stderr: String,
    pub has_warnings: bool,
    pub raw: Option<serde_json::Value>,
}

/// Uniform capability set over heterogeneous execution substrates.
///
/// Every operation returns a stage-tagged result; a failure short-circuits
/// the case but outputs already produced by earlier stages are retained by
/// the orchestrator.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn preprocess(&self, unit: &SourceUnit) -> StageResult<PreprocessOutput>;

    /// Produce something executable. `preprocessed` is the retained output
    /// of the preprocess stage; local-compile backends build from it rather
    /// than from the original source.
    async fn compile_or_assemble(
        &self,
        unit: &SourceUnit,
        preprocessed: Option<&str>,
    ) -> StageResult<BuildOutput>;

    async fn execute(&self, unit: &SourceUnit, build: &BuildOutput) -> StageResult<ExecuteOutput>;

    fn name(&self) -> &'static str;
}

/// Seam for tests: produces the backend matching a compiler configuration.
pub trait BackendFactory: Send + Sync {
    fn backend_for(&self, spec: &crate::model::CompilerSpec) -> Arc<dyn Backend>;
}
