//! Per-case artifact files.
//!
//! Each case gets `<results>/<test>_<compiler>/` containing whatever its
//! stages produced: `preprocessed.c`, `output.s`, `run_stdout.txt`,
//! `run_stderr.txt`, per-stage diagnostics (`preprocess_err.txt`,
//! `compile_err.txt`), `error.txt`, the machine-readable `result.json`, and
//! `debug_response.json` when raw API responses were kept.

use anyhow::{Context, Result};
use ccmatrix_core::CaseOutcome;
use std::fs;
use std::path::{Path, PathBuf};

fn safe_name(name: &str) -> String {
    name.replace([' ', '/'], "_")
}

/// Reset the results directory. Stale per-case directories from a previous
/// run would otherwise survive and pollute reports.
pub fn prepare_results_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("failed to clear results dir {}", dir.display()))?;
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create results dir {}", dir.display()))
}

pub fn case_dir(results_dir: &Path, outcome: &CaseOutcome) -> PathBuf {
    results_dir.join(format!(
        "{}_{}",
        outcome.test_name,
        safe_name(&outcome.compiler_display)
    ))
}

pub fn write_case(results_dir: &Path, outcome: &CaseOutcome) -> Result<PathBuf> {
    let dir = case_dir(results_dir, outcome);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create artifact dir {}", dir.display()))?;

    let a = &outcome.artifacts;
    if let Some(text) = &a.preprocessed {
        fs::write(dir.join("preprocessed.c"), text)?;
    }
    if let Some(text) = &a.assembly {
        fs::write(dir.join("output.s"), text)?;
    }
    if let Some(text) = &a.run_stdout {
        fs::write(dir.join("run_stdout.txt"), text)?;
    }
    if let Some(text) = &a.run_stderr {
        fs::write(dir.join("run_stderr.txt"), text)?;
    }
    if let Some(text) = a.preprocess_stderr.as_deref().filter(|t| !t.is_empty()) {
        fs::write(dir.join("preprocess_err.txt"), text)?;
    }
    if let Some(text) = a.compile_stderr.as_deref().filter(|t| !t.is_empty()) {
        fs::write(dir.join("compile_err.txt"), text)?;
    }
    if let Some(err) = &outcome.error {
        let mut text = err.to_string();
        if let Some(detail) = &err.detail {
            text.push('\n');
            text.push_str(detail);
        }
        text.push('\n');
        fs::write(dir.join("error.txt"), text)?;
    }
    if !a.raw_responses.is_empty() {
        fs::write(
            dir.join("debug_response.json"),
            serde_json::to_string_pretty(&a.raw_responses)?,
        )?;
    }
    fs::write(
        dir.join("result.json"),
        serde_json::to_string_pretty(outcome)?,
    )?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccmatrix_core::errors::{Stage, StageError};
    use ccmatrix_core::model::{CaseStatus, StageArtifacts};

    fn outcome() -> CaseOutcome {
        CaseOutcome {
            test_name: "feature_modern".into(),
            group: "feature".into(),
            variant: "modern".into(),
            variant_display: "modern".into(),
            is_auto: false,
            detect_value: Some(1),
            compiler_nickname: Some("gcc15".into()),
            compiler_display: "GCC 15.2".into(),
            compiler_api: "cg152".into(),
            status: CaseStatus::Pass,
            stage: Some(Stage::Execute),
            detected_value: Some(1),
            has_warnings: false,
            error: None,
            artifacts: StageArtifacts {
                preprocessed: Some("int main(void) { return 0; }\n".into()),
                run_stdout: Some("hello\n".into()),
                run_stderr: Some(String::new()),
                exit_code: Some(0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn writes_only_produced_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_case(tmp.path(), &outcome()).unwrap();
        assert_eq!(dir, tmp.path().join("feature_modern_GCC_15.2"));
        assert!(dir.join("preprocessed.c").is_file());
        assert!(dir.join("run_stdout.txt").is_file());
        assert!(dir.join("result.json").is_file());
        // No assembly, no error, no diagnostics, no raw responses.
        assert!(!dir.join("output.s").exists());
        assert!(!dir.join("error.txt").exists());
        assert!(!dir.join("preprocess_err.txt").exists());
        assert!(!dir.join("compile_err.txt").exists());
        assert!(!dir.join("debug_response.json").exists());
    }

    #[test]
    fn stage_diagnostics_get_their_own_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut out = outcome();
        out.artifacts.preprocess_stderr = Some("warning: extra tokens".into());
        out.artifacts.compile_stderr = Some("warning: unused variable".into());
        let dir = write_case(tmp.path(), &out).unwrap();
        assert_eq!(
            fs::read_to_string(dir.join("preprocess_err.txt")).unwrap(),
            "warning: extra tokens"
        );
        assert_eq!(
            fs::read_to_string(dir.join("compile_err.txt")).unwrap(),
            "warning: unused variable"
        );
    }

    #[test]
    fn prepare_results_dir_clears_previous_run() {
        let tmp = tempfile::tempdir().unwrap();
        let results = tmp.path().join("results");
        let stale = results.join("old_case");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("result.json"), "{}").unwrap();
        prepare_results_dir(&results).unwrap();
        assert!(results.is_dir());
        assert!(!stale.exists());
    }

    #[test]
    fn error_text_includes_detail() {
        let tmp = tempfile::tempdir().unwrap();
        let mut out = outcome();
        out.status = CaseStatus::Fail;
        out.error = Some(
            StageError::compiler_diagnostic(Stage::Compile, "compilation failed")
                .with_detail("error: expected ';'"),
        );
        let dir = write_case(tmp.path(), &out).unwrap();
        let text = fs::read_to_string(dir.join("error.txt")).unwrap();
        assert!(text.contains("compile compiler-diagnostic"));
        assert!(text.contains("expected ';'"));
    }

    #[test]
    fn result_json_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_case(tmp.path(), &outcome()).unwrap();
        let text = fs::read_to_string(dir.join("result.json")).unwrap();
        let parsed: CaseOutcome = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.test_name, "feature_modern");
        assert_eq!(parsed.status, CaseStatus::Pass);
    }
}
