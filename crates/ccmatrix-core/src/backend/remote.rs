//! Compiler Explorer style API client and the pure-remote backend.
//!
//! All requests go to `POST {base}/{compiler}/compile` with a JSON payload
//! whose `options` block selects the operation: `producePp` for
//! preprocessing, assembly filters for compilation, `executorRequest` for
//! build-and-run. Responses carry line-structured `stdout`/`stderr`/`asm`
//! arrays and an exit `code`.

use super::{
    Backend, BackendFactory, BinaryRef, BuildOutput, ExecuteOutput, PreprocessOutput, SourceUnit,
};
use crate::errors::{Stage, StageError, StageResult};
use crate::includes;
use crate::model::{CompilerSpec, ExecMode};
use crate::pacer::Pacer;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://godbolt.org/api/compiler";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TextLine {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub stdout: Vec<TextLine>,
    #[serde(default)]
    pub stderr: Vec<TextLine>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PpOutput {
    #[serde(default)]
    pub output: Option<String>,
}

/// The subset of the API response the engine consumes.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub stdout: Vec<TextLine>,
    #[serde(default)]
    pub stderr: Vec<TextLine>,
    #[serde(default)]
    pub asm: Option<Vec<TextLine>>,
    #[serde(default)]
    pub pp_output: Option<PpOutput>,
    #[serde(default)]
    pub did_execute: Option<bool>,
    #[serde(default)]
    pub build_result: Option<BuildResult>,
}

impl ApiResponse {
    pub fn assembly_text(&self) -> String {
        join_lines(self.asm.as_deref().unwrap_or_default())
    }

    pub fn stdout_text(&self) -> String {
        join_lines(&self.stdout)
    }

    pub fn stderr_text(&self) -> String {
        join_lines(&self.stderr)
    }

    /// Compiler diagnostics. For executor responses the build output lives
    /// under `buildResult`; top-level streams are the program's own output.
    pub fn compiler_stderr(&self) -> String {
        if let Some(build) = &self.build_result {
            let err = join_lines(&build.stderr);
            if !err.is_empty() {
                return err;
            }
            return join_lines(&build.stdout);
        }
        let err = self.stderr_text();
        if !err.is_empty() {
            return err;
        }
        self.stdout_text()
    }

    pub fn compile_failed(&self) -> bool {
        self.code.unwrap_or(0) != 0
    }
}

pub fn join_lines(lines: &[TextLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Heuristic warning sniff over compiler diagnostics, mirroring how the
/// report layer flags otherwise-passing cases.
pub fn has_warnings(diagnostics: &str) -> bool {
    static PATTERN: &str = r"(?i)\bwarning\b";
    Regex::new(PATTERN)
        .map(|re| re.is_match(diagnostics))
        .unwrap_or(false)
}

/// Low-level API client: pacing, transport, payload assembly.
#[derive(Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    base_url: String,
    pacer: Arc<Pacer>,
    keep_raw: bool,
}

impl ExplorerClient {
    pub fn new(base_url: impl Into<String>, pacer: Arc<Pacer>, keep_raw: bool) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            pacer,
            keep_raw,
        }
    }

    async fn post(&self, compiler: &str, payload: &Value, stage: Stage) -> StageResult<(ApiResponse, Option<Value>)> {
        // Single shared pacing discipline, applied before every request.
        self.pacer.pace().await;

        let url = format!("{}/{}/compile", self.base_url, compiler);
        debug!(%url, %stage, "remote request");
        let resp = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| StageError::transport(stage, format!("network error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StageError::api(stage, format!("HTTP {status}")).with_detail(body));
        }

        let raw: Value = resp
            .json()
            .await
            .map_err(|e| StageError::api(stage, format!("invalid JSON in response: {e}")))?;
        let parsed: ApiResponse = serde_json::from_value(raw.clone())
            .map_err(|e| StageError::api(stage, format!("unexpected response shape: {e}")))?;
        Ok((parsed, self.keep_raw.then_some(raw)))
    }

    fn base_payload(&self, compiler: &str, unit: &SourceUnit) -> Value {
        let files: Vec<Value> = unit
            .files
            .iter()
            .map(|(name, contents)| json!({ "filename": name, "contents": contents }))
            .collect();
        json!({
            "source": unit.source,
            "compiler": compiler,
            "lang": unit.language,
            "files": files,
            "bypassCache": false,
            "allowStoreCodeDebug": true,
        })
    }

    fn base_options(&self, unit: &SourceUnit) -> Value {
        json!({
            "userArguments": unit.compiler_args,
            "tools": [],
            "libraries": [],
            "executeParameters": { "args": unit.run_args, "stdin": unit.stdin },
        })
    }

    /// Run the preprocessor and return its output with the original
    /// `#include` directives restored (header filtering would otherwise
    /// discard them, leaving the artifact unbuildable locally). Macro probe
    /// lines pass through verbatim; the caller extracts and strips those.
    pub async fn preprocess(
        &self,
        compiler: &str,
        unit: &SourceUnit,
    ) -> StageResult<PreprocessOutput> {
        let mut marked_unit = unit.clone();
        let markers;
        (marked_unit.source, markers) = includes::mark(&unit.source);
        let unit = &marked_unit;

        let mut payload = self.base_payload(compiler, unit);
        payload["options"] = self.base_options(unit);
        payload["options"]["compilerOptions"] = json!({
            "producePp": { "filter-headers": true, "clang-format": false },
            "overrides": [],
        });
        payload["options"]["filters"] = json!({
            "binary": false,
            "binaryObject": false,
            "execute": false,
            "intel": true,
            "demangle": true,
            "labels": true,
            "libraryCode": true,
            "directives": true,
            "commentOnly": true,
            "trim": false,
            "debugCalls": false,
        });

        let (resp, raw) = self.post(compiler, &payload, Stage::Preprocess).await?;
        let diagnostics = resp.compiler_stderr();
        if resp.compile_failed() {
            return Err(
                StageError::compiler_diagnostic(Stage::Preprocess, "preprocessing failed")
                    .with_detail(diagnostics),
            );
        }
        let text = resp
            .pp_output
            .and_then(|pp| pp.output)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(StageError::api(Stage::Preprocess, "no preprocessed output in response"));
        }
        let text = includes::restore(&text, &markers);
        Ok(PreprocessOutput {
            has_warnings: has_warnings(&diagnostics),
            text,
            compiler_stderr: diagnostics,
            raw,
        })
    }

    /// Compile to assembly. `filtered` strips directives/labels/comments for
    /// display; local re-assembly needs the unfiltered text to keep `.globl`
    /// and friends.
    pub async fn compile(
        &self,
        compiler: &str,
        unit: &SourceUnit,
        filtered: bool,
    ) -> StageResult<(String, String, Option<Value>)> {
        let mut payload = self.base_payload(compiler, unit);
        payload["options"] = self.base_options(unit);
        payload["options"]["compilerOptions"] = json!({
            "skipAsm": false,
            "executorRequest": false,
            "overrides": [],
        });
        payload["options"]["filters"] = json!({
            "binary": false,
            "binaryObject": false,
            "commentOnly": filtered,
            "demangle": true,
            "directives": filtered,
            "execute": false,
            "intel": false,
            "labels": filtered,
            "libraryCode": false,
            "trim": false,
            "debugCalls": false,
        });

        let (resp, raw) = self.post(compiler, &payload, Stage::Compile).await?;
        let diagnostics = resp.compiler_stderr();
        if resp.compile_failed() {
            return Err(
                StageError::compiler_diagnostic(Stage::Compile, "compilation failed")
                    .with_detail(diagnostics),
            );
        }
        Ok((resp.assembly_text(), diagnostics, raw))
    }

    /// Build and execute in one request.
    pub async fn execute(&self, compiler: &str, unit: &SourceUnit) -> StageResult<ExecuteOutput> {
        let mut payload = self.base_payload(compiler, unit);
        payload["options"] = self.base_options(unit);
        payload["options"]["executeParameters"] =
            json!({ "args": unit.run_args, "stdin": unit.stdin, "runtimeTools": [] });
        payload["options"]["compilerOptions"] = json!({ "executorRequest": true });
        payload["options"]["filters"] = json!({ "execute": true });

        let (resp, raw) = self.post(compiler, &payload, Stage::Execute).await?;
        let diagnostics = resp.compiler_stderr();
        if !resp.did_execute.unwrap_or(false) {
            // Build failed before anything could run; this is the compiler
            // under test speaking, not the harness.
            return Err(
                StageError::compiler_diagnostic(Stage::Compile, "build failed, nothing executed")
                    .with_detail(diagnostics),
            );
        }
        Ok(ExecuteOutput {
            stdout: resp.stdout_text(),
            stderr: resp.stderr_text(),
            exit_code: resp.code.unwrap_or(-1),
            has_warnings: has_warnings(&diagnostics),
            compiler_stderr: diagnostics,
            raw,
        })
    }
}

/// Backend for compilers the remote service can execute directly.
pub struct RemoteBackend {
    client: ExplorerClient,
    spec: CompilerSpec,
}

impl RemoteBackend {
    pub fn new(client: ExplorerClient, spec: CompilerSpec) -> Self {
        Self { client, spec }
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn preprocess(&self, unit: &SourceUnit) -> StageResult<PreprocessOutput> {
        self.client.preprocess(&self.spec.api_name, unit).await
    }

    async fn compile_or_assemble(
        &self,
        _unit: &SourceUnit,
        _preprocessed: Option<&str>,
    ) -> StageResult<BuildOutput> {
        // The executor request compiles and runs in one round trip, so the
        // build stage has nothing to do up front; build diagnostics surface
        // from execute() tagged with the compile stage.
        Ok(BuildOutput {
            assembly: None,
            binary: BinaryRef::Remote,
            compiler_stderr: String::new(),
            has_warnings: false,
            raw: None,
        })
    }

    async fn execute(&self, unit: &SourceUnit, _build: &BuildOutput) -> StageResult<ExecuteOutput> {
        self.client.execute(&self.spec.api_name, unit).await
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Default factory: remote execution, local re-assembly, or local compile,
/// selected by the compiler's configured mode.
pub struct ExplorerBackendFactory {
    pub client: ExplorerClient,
}

impl BackendFactory for ExplorerBackendFactory {
    fn backend_for(&self, spec: &CompilerSpec) -> Arc<dyn Backend> {
        match &spec.mode {
            ExecMode::Remote => Arc::new(RemoteBackend::new(self.client.clone(), spec.clone())),
            ExecMode::LocalAsm { .. } => Arc::new(super::local::LocalAsmBackend::new(
                self.client.clone(),
                spec.clone(),
            )),
            ExecMode::LocalCompile { .. } => Arc::new(super::local::LocalCompileBackend::new(
                self.client.clone(),
                spec.clone(),
            )),
        }
    }
}
