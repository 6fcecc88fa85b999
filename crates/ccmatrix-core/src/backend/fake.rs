//! Scripted backend for orchestrator and resolver contract tests.

use super::{
    Backend, BackendFactory, BinaryRef, BuildOutput, ExecuteOutput, PreprocessOutput, SourceUnit,
};
use crate::errors::{StageError, StageResult};
use crate::model::CompilerSpec;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Backend with canned responses. Defaults to a clean pass: the preprocess
/// output echoes the submitted source (so injected probe lines survive the
/// round trip, like a real preprocessor), the build succeeds, and the
/// program exits 0 with empty output.
#[derive(Default)]
pub struct FakeBackend {
    preprocess_error: Option<StageError>,
    build_error: Option<StageError>,
    execute_error: Option<StageError>,
    /// Substituted for the probed macro name in preprocess output, making
    /// the fake behave like a preprocessor that expanded the macro.
    macro_expansion: Option<(String, i64)>,
    stdout: String,
    exit_code: i32,
    pub preprocess_calls: AtomicUsize,
    pub build_calls: AtomicUsize,
    pub execute_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn with_macro_value(mut self, name: &str, value: i64) -> Self {
        self.macro_expansion = Some((name.to_string(), value));
        self
    }

    pub fn with_exit(mut self, exit_code: i32, stdout: &str) -> Self {
        self.exit_code = exit_code;
        self.stdout = stdout.to_string();
        self
    }

    pub fn failing_preprocess(mut self, err: StageError) -> Self {
        self.preprocess_error = Some(err);
        self
    }

    pub fn failing_build(mut self, err: StageError) -> Self {
        self.build_error = Some(err);
        self
    }

    pub fn failing_execute(mut self, err: StageError) -> Self {
        self.execute_error = Some(err);
        self
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn preprocess(&self, unit: &SourceUnit) -> StageResult<PreprocessOutput> {
        self.preprocess_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.preprocess_error {
            return Err(err.clone());
        }
        let text = match &self.macro_expansion {
            Some((name, value)) => {
                // Expand the probed macro the way a preprocessor would.
                unit.source.replace(&format!("({name})"), &format!("({value})"))
            }
            None => unit.source.clone(),
        };
        Ok(PreprocessOutput {
            text,
            compiler_stderr: String::new(),
            has_warnings: false,
            raw: None,
        })
    }

    async fn compile_or_assemble(
        &self,
        _unit: &SourceUnit,
        _preprocessed: Option<&str>,
    ) -> StageResult<BuildOutput> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.build_error {
            return Err(err.clone());
        }
        Ok(BuildOutput {
            assembly: None,
            binary: BinaryRef::Remote,
            compiler_stderr: String::new(),
            has_warnings: false,
            raw: None,
        })
    }

    async fn execute(&self, _unit: &SourceUnit, _build: &BuildOutput) -> StageResult<ExecuteOutput> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.execute_error {
            return Err(err.clone());
        }
        Ok(ExecuteOutput {
            stdout: self.stdout.clone(),
            stderr: String::new(),
            exit_code: self.exit_code,
            compiler_stderr: String::new(),
            has_warnings: false,
            raw: None,
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Factory handing every compiler the same scripted backend.
pub struct FakeFactory {
    pub backend: Arc<FakeBackend>,
}

impl FakeFactory {
    pub fn new(backend: FakeBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }
}

impl BackendFactory for FakeFactory {
    fn backend_for(&self, _spec: &CompilerSpec) -> Arc<dyn Backend> {
        self.backend.clone()
    }
}
