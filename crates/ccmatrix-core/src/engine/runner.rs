//! Sequential case orchestration.
//!
//! Each case walks the same pipeline regardless of backend: resolve (auto
//! cases only), preprocess, compile-or-assemble, execute, decide. Stages
//! short-circuit on error but artifacts produced by earlier stages are
//! retained on the outcome. Infrastructure errors mark the case `error` and
//! never abort the run.

use crate::backend::{BackendFactory, SourceUnit};
use crate::errors::{ErrorKind, Stage, StageError};
use crate::model::{Case, CaseOutcome, CaseStatus, PassCriterion, StageArtifacts, TestSpec};
use crate::probe;
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::report::RunArtifacts;
use crate::resolver::VariantResolver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct Runner {
    pub factory: Arc<dyn BackendFactory>,
    pub language: String,
    /// Stop every case after the preprocess stage.
    pub preprocess_only: bool,
}

impl Runner {
    /// Run all cases in order. Cases are strictly sequential; remote pacing
    /// assumes no two requests are ever in flight at once.
    ///
    /// An auto case's outcome is recorded under its probed value; a later
    /// concrete variant with the matching `detect_value` on the same
    /// compiler and group reuses that outcome instead of executing the same
    /// configuration again.
    pub async fn run(
        &self,
        cases: &[Case],
        all_tests: &[TestSpec],
        progress: Option<ProgressSink>,
    ) -> RunArtifacts {
        let started = Instant::now();
        let resolver = VariantResolver::new();
        let total = cases.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut auto_seen: HashMap<(String, String), HashMap<i64, CaseOutcome>> = HashMap::new();
        for case in cases {
            let key = (case.compiler.api_name.clone(), case.test.group.clone());
            let reused = if case.test.auto {
                None
            } else {
                case.test
                    .detect_value
                    .and_then(|v| auto_seen.get(&key).and_then(|m| m.get(&v)))
                    .map(|prior| relabel(prior, &case.test))
            };
            let outcome = match reused {
                Some(outcome) => {
                    debug!(
                        test = %case.test.test_name,
                        compiler = %case.compiler.display_name,
                        "reusing auto outcome"
                    );
                    outcome
                }
                None => {
                    let outcome = self.run_case(&resolver, case, all_tests).await;
                    if case.test.auto {
                        if let Some(value) = outcome.detected_value {
                            auto_seen
                                .entry(key)
                                .or_default()
                                .insert(value, outcome.clone());
                        }
                    }
                    outcome
                }
            };
            info!(
                test = %outcome.test_name,
                compiler = %outcome.compiler_display,
                status = outcome.status.as_str(),
                "case finished"
            );
            if let Some(sink) = &progress {
                sink(ProgressEvent {
                    done: outcomes.len() + 1,
                    total,
                    test_name: outcome.test_name.clone(),
                    compiler_display: outcome.compiler_display.clone(),
                    status: outcome.status,
                });
            }
            outcomes.push(outcome);
        }
        RunArtifacts {
            outcomes,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn run_case(
        &self,
        resolver: &VariantResolver,
        case: &Case,
        all_tests: &[TestSpec],
    ) -> CaseOutcome {
        let backend = self.factory.backend_for(&case.compiler);
        debug!(
            test = %case.test.test_name,
            compiler = %case.compiler.display_name,
            backend = backend.name(),
            "case starting"
        );

        let unit = SourceUnit {
            source: case.source.clone(),
            files: case.files.clone(),
            compiler_args: case.compiler.extra_flags.join(" "),
            language: self.language.clone(),
            stdin: case.test.stdin.clone(),
            run_args: case.test.run_args.clone(),
        };

        let mut artifacts = StageArtifacts::default();
        let mut warnings = false;
        let mut test = case.test.clone();
        let mut detected: Option<i64> = None;

        let result: Result<(), StageError> = async {
            let mut pending_pp = None;
            let mut probe_injected = false;

            if test.auto {
                let probed = resolver
                    .probe(backend.as_ref(), &case.compiler.api_name, &test, &unit)
                    .await?;
                detected = Some(probed.value);
                probe_injected = probed.preprocess.is_some();
                pending_pp = probed.preprocess;
                let concrete = resolver
                    .match_variant(all_tests, &test.group, probed.value)?
                    .clone();
                // The auto case adopts the concrete variant's identity and
                // pass criteria; source and flags stay its own.
                test.variant = concrete.variant;
                test.display_name = concrete.display_name;
                test.detect_value = concrete.detect_value;
                test.pass_when = concrete.pass_when;
                test.expect_exit = concrete.expect_exit;
            }

            // Macro criteria still need a probed value when resolution did
            // not already supply one.
            let probe_name = if detected.is_none()
                && matches!(
                    test.pass_when,
                    PassCriterion::MacroMatch | PassCriterion::Both
                ) {
                test.detect_macro.clone()
            } else {
                None
            };

            let pp = match pending_pp {
                Some(pp) => pp,
                None => {
                    let mut pp_unit = unit.clone();
                    if let Some(name) = &probe_name {
                        pp_unit.source = probe::inject(&unit.source, name);
                        probe_injected = true;
                    }
                    backend.preprocess(&pp_unit).await?
                }
            };
            if let Some(name) = &probe_name {
                detected = probe::extract(&pp.text, name);
            }
            let text = match (probe_injected, test.detect_macro.as_deref()) {
                (true, Some(name)) => probe::strip(&pp.text, name),
                _ => pp.text,
            };
            artifacts.preprocessed = Some(text);
            if !pp.compiler_stderr.is_empty() {
                artifacts.preprocess_stderr = Some(pp.compiler_stderr);
            }
            warnings |= pp.has_warnings;
            if let Some(raw) = pp.raw {
                artifacts.raw_responses.push(raw);
            }

            if self.preprocess_only {
                return Ok(());
            }

            let build = backend
                .compile_or_assemble(&unit, artifacts.preprocessed.as_deref())
                .await?;
            artifacts.assembly = build.assembly.clone();
            if !build.compiler_stderr.is_empty() {
                artifacts.compile_stderr = Some(build.compiler_stderr.clone());
            }
            warnings |= build.has_warnings;
            if let Some(raw) = build.raw.clone() {
                artifacts.raw_responses.push(raw);
            }

            let exec = backend.execute(&unit, &build).await?;
            artifacts.run_stdout = Some(exec.stdout);
            artifacts.run_stderr = Some(exec.stderr);
            artifacts.exit_code = Some(exec.exit_code);
            // Remote mode bundles the build into the execute request, so
            // build diagnostics may only surface here.
            if !exec.compiler_stderr.is_empty() && artifacts.compile_stderr.is_none() {
                artifacts.compile_stderr = Some(exec.compiler_stderr);
            }
            warnings |= exec.has_warnings;
            if let Some(raw) = exec.raw {
                artifacts.raw_responses.push(raw);
            }

            decide(&test, detected, exec.exit_code)
        }
        .await;

        let (status, stage, error) = match result {
            Ok(()) => {
                let stage = if self.preprocess_only {
                    Stage::Preprocess
                } else {
                    Stage::Execute
                };
                (CaseStatus::Pass, Some(stage), None)
            }
            Err(err) => (status_for(&err), Some(err.stage), Some(err)),
        };

        CaseOutcome {
            test_name: case.test.test_name.clone(),
            group: test.group.clone(),
            variant: test.variant.clone(),
            variant_display: test.display_name.clone(),
            is_auto: case.test.auto,
            detect_value: test.detect_value,
            compiler_nickname: case.compiler.nickname.clone(),
            compiler_display: case.compiler.display_name.clone(),
            compiler_api: case.compiler.api_name.clone(),
            status,
            stage,
            detected_value: detected,
            has_warnings: warnings,
            error,
            artifacts,
        }
    }
}

/// Re-label an auto case's outcome as the concrete variant it resolved to.
/// Everything observed during execution carries over unchanged.
fn relabel(outcome: &CaseOutcome, test: &TestSpec) -> CaseOutcome {
    CaseOutcome {
        test_name: test.test_name.clone(),
        variant: test.variant.clone(),
        variant_display: test.display_name.clone(),
        is_auto: false,
        detect_value: test.detect_value,
        ..outcome.clone()
    }
}

/// Map a stage error to a case status. Infrastructure faults are `error`,
/// unresolved auto variants are `skip`, everything else is a test `fail`.
fn status_for(err: &StageError) -> CaseStatus {
    if err.kind.is_infrastructure() {
        CaseStatus::Error
    } else if err.kind == ErrorKind::VariantUnresolved {
        CaseStatus::Skip
    } else {
        CaseStatus::Fail
    }
}

/// Apply the declared pass criterion to a completed execution.
fn decide(test: &TestSpec, detected: Option<i64>, exit_code: i32) -> Result<(), StageError> {
    let exit_ok = || -> Result<(), StageError> {
        if exit_code == test.expect_exit {
            Ok(())
        } else {
            Err(StageError::runtime_diagnostic(format!(
                "exit code {exit_code}, expected {}",
                test.expect_exit
            )))
        }
    };
    let macro_ok = || -> Result<(), StageError> {
        match (detected, test.detect_value) {
            (Some(got), Some(want)) if got == want => Ok(()),
            (got, want) => Err(StageError::new(
                Stage::Preprocess,
                ErrorKind::CompilerDiagnostic,
                match (got, want) {
                    (Some(got), Some(want)) => {
                        format!("macro expanded to {got}, expected {want}")
                    }
                    (None, _) => "macro value could not be determined".to_string(),
                    (_, None) => "no expected macro value declared".to_string(),
                },
            )),
        }
    };
    match test.pass_when {
        PassCriterion::ExitCode => exit_ok(),
        PassCriterion::MacroMatch => macro_ok(),
        PassCriterion::Both => {
            macro_ok()?;
            exit_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{FakeBackend, FakeFactory};
    use crate::model::{CompilerSpec, ExecMode};
    use std::sync::atomic::Ordering;

    fn compiler(api: &str) -> CompilerSpec {
        CompilerSpec {
            api_name: api.to_string(),
            nickname: Some(api.to_string()),
            display_name: api.to_uppercase(),
            extra_flags: vec!["-O2".to_string()],
            mode: ExecMode::Remote,
        }
    }

    fn test_spec(group: &str, variant: &str, auto: bool, detect_value: Option<i64>) -> TestSpec {
        TestSpec {
            test_name: format!("{group}_{variant}"),
            group: group.to_string(),
            variant: variant.to_string(),
            display_name: variant.to_string(),
            file_name: "test.c".into(),
            additional_files: vec![],
            include_dirs: vec![],
            prepend_lines: vec![],
            detect_macro: Some("FEATURE_IMPL".to_string()),
            detect_value,
            auto,
            include_in_table: !auto,
            pass_when: if detect_value.is_some() {
                PassCriterion::Both
            } else {
                PassCriterion::ExitCode
            },
            expect_exit: 0,
            stdin: String::new(),
            run_args: vec![],
        }
    }

    fn feature_group() -> Vec<TestSpec> {
        vec![
            test_spec("feature", "auto", true, None),
            test_spec("feature", "modern", false, Some(1)),
            test_spec("feature", "fallback", false, Some(2)),
        ]
    }

    fn case_for(test: &TestSpec, api: &str) -> Case {
        Case {
            compiler: compiler(api),
            test: test.clone(),
            source: "int main(void) { return (FEATURE_IMPL); }\n".to_string(),
            files: vec![],
        }
    }

    fn runner(backend: FakeBackend) -> (Runner, Arc<FakeBackend>) {
        let factory = FakeFactory::new(backend);
        let backend = factory.backend.clone();
        let runner = Runner {
            factory: Arc::new(factory),
            language: "c".to_string(),
            preprocess_only: false,
        };
        (runner, backend)
    }

    #[tokio::test]
    async fn auto_case_resolves_to_matching_variant_and_passes() {
        let tests = feature_group();
        let (runner, _) = runner(FakeBackend::passing().with_macro_value("FEATURE_IMPL", 1));
        let arts = runner.run(&[case_for(&tests[0], "cg152")], &tests, None).await;
        let out = &arts.outcomes[0];
        assert_eq!(out.status, CaseStatus::Pass);
        assert_eq!(out.variant, "modern");
        assert!(out.is_auto);
        assert_eq!(out.detected_value, Some(1));
        // Probe lines never leak into the stored artifact.
        assert!(!out.artifacts.preprocessed.as_deref().unwrap().contains("PROBE"));
    }

    #[tokio::test]
    async fn matching_concrete_variant_reuses_auto_outcome() {
        let tests = feature_group();
        let (runner, backend) = runner(FakeBackend::passing().with_macro_value("FEATURE_IMPL", 1));
        let cases = vec![
            case_for(&tests[0], "cg152"), // auto, resolves to modern
            case_for(&tests[1], "cg152"), // modern, detect_value 1
            case_for(&tests[2], "cg152"), // fallback, detect_value 2
        ];
        let arts = runner.run(&cases, &tests, None).await;
        assert_eq!(arts.outcomes.len(), 3);

        let modern = &arts.outcomes[1];
        assert_eq!(modern.test_name, "feature_modern");
        assert_eq!(modern.variant, "modern");
        assert!(!modern.is_auto);
        assert_eq!(modern.status, CaseStatus::Pass);
        // The auto case already ran this configuration; only the auto and
        // fallback cases actually executed.
        assert_eq!(backend.execute_calls.load(Ordering::SeqCst), 2);
        // Fallback expects 2 but the preprocessor reports 1.
        assert_eq!(arts.outcomes[2].status, CaseStatus::Fail);
    }

    #[tokio::test]
    async fn reuse_is_scoped_to_the_probed_compiler() {
        let tests = feature_group();
        let (runner, backend) = runner(FakeBackend::passing().with_macro_value("FEATURE_IMPL", 1));
        let cases = vec![
            case_for(&tests[0], "cg152"),
            case_for(&tests[1], "cclang2110"), // different compiler, no reuse
        ];
        let arts = runner.run(&cases, &tests, None).await;
        assert_eq!(arts.outcomes.len(), 2);
        assert_eq!(backend.execute_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unresolved_auto_case_is_skipped() {
        let tests = feature_group();
        // 9 matches no declared variant.
        let (runner, _) = runner(FakeBackend::passing().with_macro_value("FEATURE_IMPL", 9));
        let arts = runner.run(&[case_for(&tests[0], "cg152")], &tests, None).await;
        let out = &arts.outcomes[0];
        assert_eq!(out.status, CaseStatus::Skip);
        assert_eq!(out.error.as_ref().unwrap().kind, ErrorKind::VariantUnresolved);
    }

    #[tokio::test]
    async fn infrastructure_error_does_not_abort_the_run() {
        let tests = feature_group();
        let err = StageError::transport(Stage::Preprocess, "connection refused");
        let (runner, backend) = runner(
            FakeBackend::passing()
                .with_macro_value("FEATURE_IMPL", 2)
                .failing_preprocess(err),
        );
        let cases = vec![case_for(&tests[1], "cg152"), case_for(&tests[1], "cclang2110")];
        let arts = runner.run(&cases, &tests, None).await;
        assert_eq!(arts.outcomes.len(), 2);
        assert!(arts.outcomes.iter().all(|o| o.status == CaseStatus::Error));
        // The second case was still attempted.
        assert_eq!(backend.preprocess_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn build_diagnostic_fails_case_and_keeps_preprocess_artifact() {
        let tests = feature_group();
        let err = StageError::compiler_diagnostic(Stage::Compile, "build failed")
            .with_detail("error: expected ';'");
        let (runner, _) = runner(
            FakeBackend::passing()
                .with_macro_value("FEATURE_IMPL", 1)
                .failing_build(err),
        );
        let arts = runner.run(&[case_for(&tests[1], "cg152")], &tests, None).await;
        let out = &arts.outcomes[0];
        assert_eq!(out.status, CaseStatus::Fail);
        assert_eq!(out.stage, Some(Stage::Compile));
        assert!(out.artifacts.preprocessed.is_some());
        assert!(out.artifacts.run_stdout.is_none());
    }

    #[tokio::test]
    async fn unexpected_exit_code_is_a_failure() {
        let tests = feature_group();
        let (runner, _) = runner(
            FakeBackend::passing()
                .with_macro_value("FEATURE_IMPL", 1)
                .with_exit(3, ""),
        );
        let arts = runner.run(&[case_for(&tests[1], "cg152")], &tests, None).await;
        let out = &arts.outcomes[0];
        assert_eq!(out.status, CaseStatus::Fail);
        assert_eq!(out.error.as_ref().unwrap().kind, ErrorKind::RuntimeDiagnostic);
        assert_eq!(out.artifacts.exit_code, Some(3));
    }

    #[tokio::test]
    async fn macro_mismatch_fails_even_when_exit_is_clean() {
        let tests = feature_group();
        // Variant expects 1 but the preprocessor reports 2.
        let (runner, _) = runner(FakeBackend::passing().with_macro_value("FEATURE_IMPL", 2));
        let arts = runner.run(&[case_for(&tests[1], "cg152")], &tests, None).await;
        let out = &arts.outcomes[0];
        assert_eq!(out.status, CaseStatus::Fail);
        assert_eq!(out.detected_value, Some(2));
    }

    #[tokio::test]
    async fn preprocess_only_stops_before_build() {
        let tests = feature_group();
        let (runner, backend) = {
            let factory = FakeFactory::new(FakeBackend::passing().with_macro_value("FEATURE_IMPL", 1));
            let backend = factory.backend.clone();
            (
                Runner {
                    factory: Arc::new(factory),
                    language: "c".to_string(),
                    preprocess_only: true,
                },
                backend,
            )
        };
        let arts = runner.run(&[case_for(&tests[1], "cg152")], &tests, None).await;
        let out = &arts.outcomes[0];
        assert_eq!(out.status, CaseStatus::Pass);
        assert_eq!(out.stage, Some(Stage::Preprocess));
        assert_eq!(backend.build_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.execute_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn progress_sink_sees_every_case() {
        let tests = feature_group();
        let (runner, _) = runner(FakeBackend::passing().with_macro_value("FEATURE_IMPL", 1));
        let cases = vec![case_for(&tests[1], "cg152"), case_for(&tests[2], "cg152")];
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink: ProgressSink = {
            let seen = seen.clone();
            Arc::new(move |ev: ProgressEvent| seen.lock().unwrap().push((ev.done, ev.total)))
        };
        runner.run(&cases, &tests, Some(sink)).await;
        assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }
}
