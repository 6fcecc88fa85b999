//! Case planning: merge group defaults into variants, apply filters, and
//! expand (compilers × tests × variants) into a flat ordered case list.
//!
//! Field inheritance is strictly field-level: a variant's own value replaces
//! the group's for that field only, list fields included. The merge runs
//! once here; execution never consults group defaults again.

use crate::config::{resolve_path, RunConfig, TestEntry, TestFields};
use crate::model::{Case, CompilerSpec, PassCriterion, TestSpec};
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Keep only compilers whose nickname is listed (empty = all).
    pub compiler_filters: Vec<String>,
    /// Keep only tests whose test_name or variant is listed (empty = all).
    pub test_filters: Vec<String>,
    /// Keep only tests in the listed groups (empty = all).
    pub group_filters: Vec<String>,
    /// Run every declared variant instead of the auto representative.
    pub run_all: bool,
}

/// Merge group defaults with one variant's overrides into a concrete spec.
fn merge_variant(group: &str, defaults: &TestFields, variant: &TestFields, base_dir: &Path) -> TestSpec {
    // Field-level override, never list concatenation.
    let pick = |v: &Option<Vec<String>>, d: &Option<Vec<String>>| -> Vec<String> {
        v.clone().or_else(|| d.clone()).unwrap_or_default()
    };

    let variant_name = variant
        .variant
        .clone()
        .or_else(|| variant.test_name.clone())
        .unwrap_or_else(|| "default".to_string());
    let test_name = variant
        .test_name
        .clone()
        .or_else(|| defaults.test_name.clone())
        .unwrap_or_else(|| format!("{group}_{variant_name}"));
    let auto = variant.auto.or(defaults.auto).unwrap_or(false);
    let file_name = variant
        .file_name
        .clone()
        .or_else(|| defaults.file_name.clone())
        .unwrap_or_default();

    let additional_files = pick(&variant.additional_files, &defaults.additional_files)
        .into_iter()
        .map(|name| {
            let path = resolve_path(base_dir, &name);
            (name, path)
        })
        .collect();
    let include_dirs = pick(&variant.include_dirs, &defaults.include_dirs)
        .into_iter()
        .map(|d| resolve_path(base_dir, &d))
        .collect();

    let detect_macro = variant
        .detect_macro
        .clone()
        .or_else(|| defaults.detect_macro.clone());
    let detect_value = variant.detect_value.or(defaults.detect_value);
    // Unless declared, a variant with a macro probe is judged on both the
    // macro value and the exit code; everything else on the exit code alone.
    let pass_when = variant.pass_when.or(defaults.pass_when).unwrap_or(
        if detect_macro.is_some() && detect_value.is_some() {
            PassCriterion::Both
        } else {
            PassCriterion::ExitCode
        },
    );

    TestSpec {
        test_name,
        group: group.to_string(),
        variant: variant_name.clone(),
        display_name: variant
            .display_name
            .clone()
            .or_else(|| defaults.display_name.clone())
            .unwrap_or(variant_name),
        file_name: resolve_path(base_dir, &file_name),
        additional_files,
        include_dirs,
        prepend_lines: pick(&variant.prepend_lines, &defaults.prepend_lines),
        detect_macro,
        detect_value,
        auto,
        include_in_table: variant
            .include_in_table
            .or(defaults.include_in_table)
            .unwrap_or(!auto),
        pass_when,
        expect_exit: variant.expect_exit.or(defaults.expect_exit).unwrap_or(0),
        stdin: variant
            .stdin
            .clone()
            .or_else(|| defaults.stdin.clone())
            .unwrap_or_default(),
        run_args: pick(&variant.run_args, &defaults.run_args),
    }
}

fn expand_entry(entry: &TestEntry, base_dir: &Path) -> Vec<TestSpec> {
    let group = entry.group.as_deref().unwrap_or("default");
    match &entry.variants {
        Some(variants) => variants
            .iter()
            .map(|v| merge_variant(group, &entry.fields, v, base_dir))
            .collect(),
        // Flat form: the entry is both the group and its only variant.
        None => vec![merge_variant(group, &TestFields::default(), &entry.fields, base_dir)],
    }
}

/// Expand all test entries into concrete variants, declaration order kept.
pub fn expand_tests(config: &RunConfig, base_dir: &Path) -> Vec<TestSpec> {
    config
        .tests
        .iter()
        .flat_map(|entry| expand_entry(entry, base_dir))
        .collect()
}

/// Load a test's additional files and everything in its include dirs.
/// Explicit files are searched in the include dirs when their direct path
/// does not exist; unreadable entries are skipped with a warning.
pub fn load_test_files(test: &TestSpec) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for (name, path) in &test.additional_files {
        if seen.contains(name) {
            continue;
        }
        let resolved = if path.is_file() {
            Some(path.clone())
        } else {
            test.include_dirs.iter().find_map(|dir| {
                let full = dir.join(name);
                if full.is_file() {
                    return Some(full);
                }
                let base = Path::new(name).file_name().map(|b| dir.join(b));
                base.filter(|p| p.is_file())
            })
        };
        match resolved {
            Some(p) => match std::fs::read_to_string(&p) {
                Ok(contents) => {
                    out.push((name.clone(), contents));
                    seen.insert(name.clone());
                }
                Err(e) => warn!(path = %p.display(), %e, "could not read additional file"),
            },
            None => warn!(path = %path.display(), "additional file not found"),
        }
    }

    for dir in &test.include_dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), %e, "could not list include directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if seen.contains(&name) {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    out.push((name.clone(), contents));
                    seen.insert(name);
                }
                Err(e) => warn!(path = %path.display(), %e, "could not read include file"),
            }
        }
    }

    out
}

/// Expand the matrix into a flat ordered case sequence.
///
/// Ordering is stable: tests in declaration order, compilers in declaration
/// order within each test. Source files are loaded here so the run itself
/// never fails on configuration problems.
pub fn plan(
    compilers: &[CompilerSpec],
    tests: &[TestSpec],
    opts: &PlanOptions,
) -> Result<Vec<Case>> {
    let compilers: Vec<&CompilerSpec> = if opts.compiler_filters.is_empty() {
        compilers.iter().collect()
    } else {
        compilers
            .iter()
            .filter(|c| {
                c.nickname
                    .as_deref()
                    .is_some_and(|n| opts.compiler_filters.iter().any(|f| f == n))
            })
            .collect()
    };
    if compilers.is_empty() {
        bail!("no compilers matching: {:?}", opts.compiler_filters);
    }

    let mut tests: Vec<&TestSpec> = tests
        .iter()
        .filter(|t| {
            opts.test_filters.is_empty()
                || opts.test_filters.iter().any(|f| f == &t.test_name || f == &t.variant)
        })
        .filter(|t| opts.group_filters.is_empty() || opts.group_filters.contains(&t.group))
        .collect();
    if tests.is_empty() {
        bail!(
            "no tests matching: {:?} groups: {:?}",
            opts.test_filters,
            opts.group_filters
        );
    }

    // Default behavior runs the auto representative per group; groups that
    // declare no auto variant keep all their variants. Explicit --test
    // filters bypass the selection.
    if !opts.run_all && opts.test_filters.is_empty() {
        let groups_with_auto: BTreeSet<&str> = tests
            .iter()
            .filter(|t| t.auto)
            .map(|t| t.group.as_str())
            .collect();
        tests.retain(|t| t.auto || !groups_with_auto.contains(t.group.as_str()));
    }

    let mut cases = Vec::with_capacity(tests.len() * compilers.len());
    for test in &tests {
        let source = std::fs::read_to_string(&test.file_name).with_context(|| {
            format!(
                "failed to read source for {}: {}",
                test.test_name,
                test.file_name.display()
            )
        })?;
        let source = if test.prepend_lines.is_empty() {
            source
        } else {
            format!("{}\n{}", test.prepend_lines.join("\n"), source)
        };
        let files = load_test_files(test);
        for compiler in &compilers {
            cases.push(Case {
                compiler: (*compiler).clone(),
                test: (*test).clone(),
                source: source.clone(),
                files: files.clone(),
            });
        }
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::model::ExecMode;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    fn sample_tests(base_dir: &Path) -> Vec<TestSpec> {
        // `"#` inside the quoted prepend_lines would close a plain r#"..."#
        // literal, so this one uses double-hash delimiters.
        let cfg = RunConfig::from_str(
            r##"
compilers: []
tests:
  - group: feature
    file_name: test.c
    detect_macro: FEATURE_IMPL
    include_dirs: [headers]
    prepend_lines: ["#define GROUP_LINE"]
    variants:
      - variant: auto
        auto: true
      - variant: modern
        detect_value: 1
        prepend_lines: ["#define FORCE_MODERN"]
      - variant: fallback
        detect_value: 2
"##,
        )
        .unwrap();
        expand_tests(&cfg, base_dir)
    }

    fn remote_compiler(nickname: &str) -> CompilerSpec {
        CompilerSpec {
            api_name: format!("api-{nickname}"),
            nickname: Some(nickname.to_string()),
            display_name: nickname.to_uppercase(),
            extra_flags: vec![],
            mode: ExecMode::Remote,
        }
    }

    #[test]
    fn variant_fields_override_group_fields_without_merging() {
        let base = Path::new("/cfg");
        let tests = sample_tests(base);
        let modern = tests.iter().find(|t| t.variant == "modern").unwrap();
        // Own prepend_lines replaces the group's entirely.
        assert_eq!(modern.prepend_lines, vec!["#define FORCE_MODERN"]);
        let fallback = tests.iter().find(|t| t.variant == "fallback").unwrap();
        // Unset fields inherit the group's value unchanged.
        assert_eq!(fallback.prepend_lines, vec!["#define GROUP_LINE"]);
        assert_eq!(fallback.include_dirs, vec![base.join("headers")]);
        assert_eq!(fallback.detect_macro.as_deref(), Some("FEATURE_IMPL"));
    }

    #[test]
    fn names_and_table_flags_are_derived() {
        let tests = sample_tests(Path::new("/cfg"));
        let auto = tests.iter().find(|t| t.variant == "auto").unwrap();
        assert_eq!(auto.test_name, "feature_auto");
        assert!(auto.auto);
        assert!(!auto.include_in_table);
        let modern = tests.iter().find(|t| t.variant == "modern").unwrap();
        assert!(modern.include_in_table);
    }

    #[test]
    fn default_plan_selects_auto_variants_only() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "test.c", "int main(void){return 0;}\n");
        let tests = sample_tests(dir.path());
        let compilers = vec![remote_compiler("gcc15")];
        let cases = plan(&compilers, &tests, &PlanOptions::default()).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].test.variant, "auto");
    }

    #[test]
    fn run_all_keeps_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "test.c", "int main(void){return 0;}\n");
        let tests = sample_tests(dir.path());
        let compilers = vec![remote_compiler("gcc15"), remote_compiler("clang21")];
        let opts = PlanOptions {
            run_all: true,
            ..Default::default()
        };
        let cases = plan(&compilers, &tests, &opts).unwrap();
        let order: Vec<(String, String)> = cases
            .iter()
            .map(|c| (c.test.variant.clone(), c.compiler.nickname.clone().unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("auto".into(), "gcc15".into()),
                ("auto".into(), "clang21".into()),
                ("modern".into(), "gcc15".into()),
                ("modern".into(), "clang21".into()),
                ("fallback".into(), "gcc15".into()),
                ("fallback".into(), "clang21".into()),
            ]
        );
    }

    #[test]
    fn prepend_lines_are_applied_to_sources() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "test.c", "int main(void){return 0;}\n");
        let tests = sample_tests(dir.path());
        let compilers = vec![remote_compiler("gcc15")];
        let opts = PlanOptions {
            test_filters: vec!["modern".into()],
            ..Default::default()
        };
        let cases = plan(&compilers, &tests, &opts).unwrap();
        assert_eq!(cases.len(), 1);
        assert!(cases[0].source.starts_with("#define FORCE_MODERN\n"));
    }

    #[test]
    fn unmatched_filters_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "test.c", "int main(void){return 0;}\n");
        let tests = sample_tests(dir.path());
        let compilers = vec![remote_compiler("gcc15")];
        let opts = PlanOptions {
            compiler_filters: vec!["no-such-compiler".into()],
            ..Default::default()
        };
        assert!(plan(&compilers, &tests, &opts).is_err());
        let opts = PlanOptions {
            test_filters: vec!["no-such-test".into()],
            ..Default::default()
        };
        assert!(plan(&compilers, &tests, &opts).is_err());
    }

    #[test]
    fn include_dir_files_are_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "test.c", "int main(void){return 0;}\n");
        let headers = dir.path().join("headers");
        std::fs::create_dir(&headers).unwrap();
        write_file(&headers, "feature_config.h", "#define PROJECT_NAME \"demo\"\n");
        let tests = sample_tests(dir.path());
        let files = load_test_files(&tests[0]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "feature_config.h");
        assert!(files[0].1.contains("PROJECT_NAME"));
    }

    #[test]
    fn groups_without_auto_keep_all_variants_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "other.c", "int main(void){return 0;}\n");
        let cfg = RunConfig::from_str(
            r#"
compilers: []
tests:
  - group: plain
    file_name: other.c
    variants:
      - variant: one
      - variant: two
"#,
        )
        .unwrap();
        let tests = expand_tests(&cfg, dir.path());
        let compilers = vec![remote_compiler("gcc15")];
        let cases = plan(&compilers, &tests, &PlanOptions::default()).unwrap();
        assert_eq!(cases.len(), 2);
    }

    #[test]
    fn run_inputs_are_inherited_and_overridable() {
        let cfg = RunConfig::from_str(
            r##"
compilers: []
tests:
  - group: io
    file_name: echo.c
    stdin: "ping\n"
    run_args: ["--verbose"]
    variants:
      - variant: plain
      - variant: quiet
        run_args: []
"##,
        )
        .unwrap();
        let tests = expand_tests(&cfg, Path::new("/cfg"));
        assert_eq!(tests[0].stdin, "ping\n");
        assert_eq!(tests[0].run_args, vec!["--verbose"]);
        // An explicitly empty list overrides the group's, it never merges.
        assert_eq!(tests[1].stdin, "ping\n");
        assert!(tests[1].run_args.is_empty());
    }

    #[test]
    fn macro_probe_tests_default_to_both_criteria() {
        let tests = sample_tests(Path::new("/cfg"));
        let modern = tests.iter().find(|t| t.variant == "modern").unwrap();
        assert_eq!(modern.pass_when, PassCriterion::Both);
        let auto = tests.iter().find(|t| t.variant == "auto").unwrap();
        // No detect_value on the auto variant itself.
        assert_eq!(auto.pass_when, PassCriterion::ExitCode);
    }
}
