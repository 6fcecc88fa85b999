//! Data model: compiler and test specifications, planned cases, and the
//! per-case outcome record handed to reporting.

use crate::errors::{Stage, StageError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a compiler's cases are executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ExecMode {
    /// Compile and execute on the remote API.
    Remote,
    /// Compile remotely to assembly, then assemble, link and run locally.
    /// Used when the compiler only exists remotely but its output must run
    /// on modern hardware (e.g. assembly from a decades-old compiler).
    LocalAsm {
        assembler: String,
        assembler_args: Vec<String>,
        linker: String,
        linker_args: Vec<String>,
    },
    /// Preprocess remotely, then compile and run with a local toolchain.
    /// Used for compilers the remote service cannot execute.
    LocalCompile {
        compiler: String,
        compiler_args: Vec<String>,
    },
}

/// One compiler configuration. Loaded once from config, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerSpec {
    /// Backend-specific identifier (the remote API's compiler id).
    pub api_name: String,
    /// Short name used for `--compiler` filtering.
    pub nickname: Option<String>,
    pub display_name: String,
    pub extra_flags: Vec<String>,
    pub mode: ExecMode,
}

impl CompilerSpec {
    /// Filesystem-safe name for per-case artifact directories.
    pub fn safe_name(&self) -> String {
        self.display_name.replace([' ', '/'], "_")
    }
}

/// Declared pass criterion for a test variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassCriterion {
    /// The run exit code must equal `expect_exit`.
    #[default]
    ExitCode,
    /// The probed macro value must equal the variant's `detect_value`.
    MacroMatch,
    /// Both of the above.
    Both,
}

/// One concrete test variant with group defaults already merged in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name, `<group>_<variant>` unless declared explicitly.
    pub test_name: String,
    pub group: String,
    pub variant: String,
    pub display_name: String,
    pub file_name: PathBuf,
    /// (name as sent to the API, resolved filesystem path).
    pub additional_files: Vec<(String, PathBuf)>,
    pub include_dirs: Vec<PathBuf>,
    pub prepend_lines: Vec<String>,
    pub detect_macro: Option<String>,
    pub detect_value: Option<i64>,
    /// Marks the representative variant run when `--all` is not given; the
    /// active concrete variant is then resolved by macro probing.
    pub auto: bool,
    pub include_in_table: bool,
    pub pass_when: PassCriterion,
    pub expect_exit: i32,
    /// Piped to the program's standard input at the execute stage.
    #[serde(default)]
    pub stdin: String,
    /// Arguments passed to the program at the execute stage.
    #[serde(default)]
    pub run_args: Vec<String>,
}

/// One (compiler, test variant) execution unit, with source already loaded
/// and prepend lines applied. Read-only after planning.
#[derive(Debug, Clone)]
pub struct Case {
    pub compiler: CompilerSpec,
    pub test: TestSpec,
    pub source: String,
    /// Additional file contents keyed by the name the API sees.
    pub files: Vec<(String, String)>,
}

/// Final status of a case. Exactly one is assigned per executed case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pass,
    Fail,
    Skip,
    Error,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pass => "pass",
            CaseStatus::Fail => "fail",
            CaseStatus::Skip => "skip",
            CaseStatus::Error => "error",
        }
    }
}

/// Artifacts captured per stage. Each field is present only if its stage
/// executed; outputs from stages before a failure are retained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Compiler diagnostics captured at the preprocess stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocess_stderr: Option<String>,
    /// Compiler diagnostics captured at the compile/assemble/link stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_stderr: Option<String>,
    /// Raw API responses, retained only in debug mode.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub raw_responses: Vec<serde_json::Value>,
}

/// The per-case record handed to reporting. Carries everything needed to
/// render summaries and tables without re-deriving pipeline decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub test_name: String,
    pub group: String,
    /// Resolved variant name (the concrete variant for auto cases).
    pub variant: String,
    pub variant_display: String,
    pub is_auto: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detect_value: Option<i64>,
    pub compiler_nickname: Option<String>,
    pub compiler_display: String,
    pub compiler_api: String,
    pub status: CaseStatus,
    /// Last stage that ran (or was running when the case ended early).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Probed macro value, when the test declares `detect_macro`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_value: Option<i64>,
    pub has_warnings: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
    pub artifacts: StageArtifacts,
}
