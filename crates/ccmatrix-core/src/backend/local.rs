//! Local toolchain backends.
//!
//! Two modes bridge the gap when the remote service cannot run a program:
//! `local-asm` re-assembles remote assembly on the invoking host, and
//! `local-compile` builds the remotely preprocessed source with a local
//! compiler. Both run the produced executable as a plain subprocess with
//! verbatim stream capture. No timeout is enforced; a hung toolchain stalls
//! the run (documented trade-off).

use super::{
    Backend, BinaryRef, BuildOutput, ExecuteOutput, PreprocessOutput, SourceUnit,
};
use crate::backend::remote::{has_warnings, ExplorerClient};
use crate::errors::{ErrorKind, Stage, StageError, StageResult};
use crate::model::{CompilerSpec, ExecMode};
use async_trait::async_trait;
use regex::Regex;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;

/// Older compilers emit absolute-address patterns that will not link on
/// hosts where PIE is the default; detect them and add `-no-pie`.
pub fn needs_no_pie(assembly: &str) -> bool {
    static PATTERNS: &[&str] = &[
        r"\bmovl?\s+\$\.?[A-Za-z_]",
        r"\bmovq?\s+\$\.?[A-Za-z_]",
        r"\bpush[lq]?\s+\$\.?[A-Za-z_]",
    ];
    PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .any(|re| re.is_match(assembly))
}

/// Identify a local tool by running `<tool> --version`. Used only for
/// report footnotes; failures simply yield no version string.
pub fn tool_version(tool: &str) -> Option<(String, String)> {
    let output = Command::new(tool).arg("--version").output().ok()?;
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    parse_tool_version(&text)
}

fn parse_tool_version(text: &str) -> Option<(String, String)> {
    let clang = Regex::new(r"(?i)clang version (\d+\.\d+(?:\.\d+)?)").ok()?;
    if let Some(c) = clang.captures(text) {
        return Some(("clang".into(), c[1].to_string()));
    }
    let tcc = Regex::new(r"(?i)tcc version ([\d.]+\w*)").ok()?;
    if let Some(c) = tcc.captures(text) {
        return Some(("tcc".into(), c[1].to_string()));
    }
    let gcc = Regex::new(r"(?i)gcc.*?(\d+\.\d+(?:\.\d+)?)").ok()?;
    if let Some(c) = gcc.captures(text) {
        return Some(("gcc".into(), c[1].to_string()));
    }
    None
}

fn run_tool(stage: Stage, program: &str, args: &[String], cwd: &Path) -> StageResult<std::process::Output> {
    debug!(%stage, program, ?args, "invoking local tool");
    Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| {
            if e.kind() == IoErrorKind::NotFound {
                StageError::local_tool_missing(stage, program)
            } else {
                StageError::new(stage, ErrorKind::LocalToolMissing, format!("{program}: {e}"))
            }
        })
}

fn run_binary(path: &Path, cwd: &Path, args: &[String], stdin: &str) -> StageResult<ExecuteOutput> {
    let mut child = Command::new(path)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            StageError::runtime_diagnostic(format!("failed to run {}: {e}", path.display()))
        })?;
    if let Some(mut pipe) = child.stdin.take() {
        use std::io::Write;
        // The program may exit without reading; a broken pipe is not a
        // failure of the case.
        let _ = pipe.write_all(stdin.as_bytes());
    }
    let output = child.wait_with_output().map_err(|e| {
        StageError::runtime_diagnostic(format!("failed to run {}: {e}", path.display()))
    })?;
    Ok(ExecuteOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
        compiler_stderr: String::new(),
        has_warnings: false,
        raw: None,
    })
}

/// Write the unit's additional files (headers etc.) into the scratch
/// directory so includes resolve during a local build.
fn write_unit_files(dir: &Path, unit: &SourceUnit) -> StageResult<()> {
    for (name, contents) in &unit.files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StageError::new(
                    Stage::Compile,
                    ErrorKind::LocalToolMissing,
                    format!("cannot create {}: {e}", parent.display()),
                )
            })?;
        }
        std::fs::write(&path, contents).map_err(|e| {
            StageError::new(
                Stage::Compile,
                ErrorKind::LocalToolMissing,
                format!("cannot write {}: {e}", path.display()),
            )
        })?;
    }
    Ok(())
}

fn scratch_dir(stage: Stage) -> StageResult<TempDir> {
    tempfile::Builder::new()
        .prefix("ccmatrix-")
        .tempdir()
        .map_err(|e| {
            StageError::new(stage, ErrorKind::LocalToolMissing, format!("tempdir: {e}"))
        })
}

/// Remote compile to assembly, local assemble + link, local run.
pub struct LocalAsmBackend {
    client: ExplorerClient,
    spec: CompilerSpec,
    assembler: String,
    assembler_args: Vec<String>,
    linker: String,
    linker_args: Vec<String>,
}

impl LocalAsmBackend {
    pub fn new(client: ExplorerClient, spec: CompilerSpec) -> Self {
        let ExecMode::LocalAsm {
            assembler,
            assembler_args,
            linker,
            linker_args,
        } = spec.mode.clone()
        else {
            unreachable!("LocalAsmBackend requires local-asm mode")
        };
        Self {
            client,
            spec,
            assembler,
            assembler_args,
            linker,
            linker_args,
        }
    }
}

#[async_trait]
impl Backend for LocalAsmBackend {
    async fn preprocess(&self, unit: &SourceUnit) -> StageResult<PreprocessOutput> {
        self.client.preprocess(&self.spec.api_name, unit).await
    }

    async fn compile_or_assemble(
        &self,
        unit: &SourceUnit,
        _preprocessed: Option<&str>,
    ) -> StageResult<BuildOutput> {
        // Unfiltered assembly keeps .globl and other directives the local
        // assembler needs.
        let (assembly, diagnostics, raw) = self
            .client
            .compile(&self.spec.api_name, unit, false)
            .await?;

        let dir = scratch_dir(Stage::Assemble)?;
        let asm_path = dir.path().join("output.s");
        std::fs::write(&asm_path, &assembly).map_err(|e| {
            StageError::new(
                Stage::Assemble,
                ErrorKind::LocalToolMissing,
                format!("cannot write assembly: {e}"),
            )
        })?;

        let obj_path = dir.path().join("output.o");
        let mut asm_args = self.assembler_args.clone();
        asm_args.extend([
            "-o".to_string(),
            obj_path.display().to_string(),
            asm_path.display().to_string(),
        ]);
        let out = run_tool(Stage::Assemble, &self.assembler, &asm_args, dir.path())?;
        if !out.status.success() {
            return Err(
                StageError::compiler_diagnostic(Stage::Assemble, "assembly failed")
                    .with_detail(String::from_utf8_lossy(&out.stderr).into_owned()),
            );
        }

        let bin_path = dir.path().join("a.out");
        let mut link_args = self.linker_args.clone();
        if needs_no_pie(&assembly) && !link_args.iter().any(|a| a == "-no-pie") {
            link_args.push("-no-pie".to_string());
        }
        link_args.extend([
            "-o".to_string(),
            bin_path.display().to_string(),
            obj_path.display().to_string(),
        ]);
        let out = run_tool(Stage::Link, &self.linker, &link_args, dir.path())?;
        if !out.status.success() {
            return Err(StageError::compiler_diagnostic(Stage::Link, "linking failed")
                .with_detail(String::from_utf8_lossy(&out.stderr).into_owned()));
        }

        Ok(BuildOutput {
            has_warnings: has_warnings(&diagnostics),
            assembly: Some(assembly),
            binary: BinaryRef::Local {
                path: bin_path,
                workdir: Arc::new(dir),
            },
            compiler_stderr: diagnostics,
            raw,
        })
    }

    async fn execute(&self, unit: &SourceUnit, build: &BuildOutput) -> StageResult<ExecuteOutput> {
        match &build.binary {
            BinaryRef::Local { path, workdir } => {
                run_binary(path, workdir.path(), &unit.run_args, &unit.stdin)
            }
            BinaryRef::Remote => Err(StageError::runtime_diagnostic(
                "no local binary was produced",
            )),
        }
    }

    fn name(&self) -> &'static str {
        "local-asm"
    }
}

/// Remote preprocess, local compile, local run.
pub struct LocalCompileBackend {
    client: ExplorerClient,
    spec: CompilerSpec,
    compiler: String,
    compiler_args: Vec<String>,
}

impl LocalCompileBackend {
    pub fn new(client: ExplorerClient, spec: CompilerSpec) -> Self {
        let ExecMode::LocalCompile {
            compiler,
            compiler_args,
        } = spec.mode.clone()
        else {
            unreachable!("LocalCompileBackend requires local-compile mode")
        };
        Self {
            client,
            spec,
            compiler,
            compiler_args,
        }
    }
}

#[async_trait]
impl Backend for LocalCompileBackend {
    async fn preprocess(&self, unit: &SourceUnit) -> StageResult<PreprocessOutput> {
        self.client.preprocess(&self.spec.api_name, unit).await
    }

    async fn compile_or_assemble(
        &self,
        unit: &SourceUnit,
        preprocessed: Option<&str>,
    ) -> StageResult<BuildOutput> {
        // The preprocessed text already reflects the compiler under test's
        // dialect decisions; the local toolchain only turns it into a binary.
        let source = preprocessed.ok_or_else(|| {
            StageError::new(
                Stage::Compile,
                ErrorKind::LocalToolMissing,
                "local compile requires preprocessed source",
            )
        })?;

        let dir = scratch_dir(Stage::Compile)?;
        let src_path = dir.path().join("source.c");
        std::fs::write(&src_path, source).map_err(|e| {
            StageError::new(
                Stage::Compile,
                ErrorKind::LocalToolMissing,
                format!("cannot write source: {e}"),
            )
        })?;
        write_unit_files(dir.path(), unit)?;

        let bin_path = dir.path().join("a.out");
        let mut args = self.compiler_args.clone();
        args.extend([
            "-o".to_string(),
            bin_path.display().to_string(),
            src_path.display().to_string(),
        ]);
        let out = run_tool(Stage::Compile, &self.compiler, &args, dir.path())?;
        let diagnostics = String::from_utf8_lossy(&out.stderr).into_owned();
        if !out.status.success() {
            return Err(
                StageError::compiler_diagnostic(Stage::Compile, "local compilation failed")
                    .with_detail(diagnostics),
            );
        }

        Ok(BuildOutput {
            assembly: None,
            binary: BinaryRef::Local {
                path: bin_path,
                workdir: Arc::new(dir),
            },
            has_warnings: has_warnings(&diagnostics),
            compiler_stderr: diagnostics,
            raw: None,
        })
    }

    async fn execute(&self, unit: &SourceUnit, build: &BuildOutput) -> StageResult<ExecuteOutput> {
        match &build.binary {
            BinaryRef::Local { path, workdir } => {
                run_binary(path, workdir.path(), &unit.run_args, &unit.stdin)
            }
            BinaryRef::Remote => Err(StageError::runtime_diagnostic(
                "no local binary was produced",
            )),
        }
    }

    fn name(&self) -> &'static str {
        "local-compile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_pie_patterns_are_detected() {
        assert!(needs_no_pie("movl $.LC0, %eax"));
        assert!(needs_no_pie("pushl $message"));
        assert!(!needs_no_pie("leaq .LC0(%rip), %rdi"));
        assert!(!needs_no_pie(""));
    }

    #[test]
    fn tool_version_parsing_recognizes_known_compilers() {
        assert_eq!(
            parse_tool_version("gcc (GCC) 15.2.1 20250813"),
            Some(("gcc".into(), "15.2.1".into()))
        );
        assert_eq!(
            parse_tool_version("Ubuntu clang version 21.1.6"),
            Some(("clang".into(), "21.1.6".into()))
        );
        assert_eq!(
            parse_tool_version("tcc version 0.9.28rc (x86_64 Linux)"),
            Some(("tcc".into(), "0.9.28rc".into()))
        );
        assert_eq!(parse_tool_version("mystery 1.0"), None);
    }

    #[test]
    fn missing_tool_maps_to_local_tool_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_tool(
            Stage::Compile,
            "ccmatrix-definitely-not-a-real-tool",
            &[],
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LocalToolMissing);
        assert_eq!(err.stage, Stage::Compile);
    }

    #[test]
    fn run_binary_captures_streams_and_exit_code() {
        // /bin/sh is a safe stand-in for a produced test binary.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("t.sh");
        std::fs::write(&script, "#!/bin/sh\necho out\necho err >&2\nexit 3\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let out = run_binary(&script, dir.path(), &[], "").unwrap();
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn local_compile_builds_include_restored_source() {
        use crate::pacer::Pacer;
        use std::time::Duration;

        let spec = CompilerSpec {
            api_name: "sdcc440".into(),
            nickname: Some("sdcc".into()),
            display_name: "SDCC 4.4".into(),
            extra_flags: vec![],
            mode: ExecMode::LocalCompile {
                compiler: "cc".into(),
                compiler_args: vec![],
            },
        };
        let client = ExplorerClient::new(
            "http://localhost",
            Arc::new(Pacer::new(Duration::ZERO)),
            false,
        );
        let backend = LocalCompileBackend::new(client, spec);
        let unit = SourceUnit {
            files: vec![(
                "feature_config.h".to_string(),
                "static int add(int a, int b) { return a + b; }\n".to_string(),
            )],
            language: "c".to_string(),
            ..Default::default()
        };

        // Preprocessed text with its include restored builds and runs.
        let restored = "#include \"feature_config.h\"\nint main(void) { return add(1, 2) - 3; }\n";
        let build = backend
            .compile_or_assemble(&unit, Some(restored))
            .await
            .unwrap();
        let out = backend.execute(&unit, &build).await.unwrap();
        assert_eq!(out.exit_code, 0);

        // Header-filtered text that lost the include cannot resolve add().
        let filtered = "int main(void) { return add(1, 2) - 3; }\n";
        let err = backend
            .compile_or_assemble(&unit, Some(filtered))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CompilerDiagnostic);
    }

    #[test]
    fn run_binary_passes_args_and_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("t.sh");
        std::fs::write(&script, "#!/bin/sh\nread line\necho \"$line:$1\"\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let out = run_binary(&script, dir.path(), &["arg1".to_string()], "hello\n").unwrap();
        assert_eq!(out.stdout.trim(), "hello:arg1");
        assert_eq!(out.exit_code, 0);
    }
}
