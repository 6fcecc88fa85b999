//! YAML configuration loading.
//!
//! The config file declares compilers, test groups and run-level options.
//! Group-level test fields act as defaults for the group's variants; the
//! field-level merge happens in the planner, so this module only maps YAML
//! into raw entries and normalizes compiler specs.

use crate::model::{CompilerSpec, ExecMode, PassCriterion};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_assembler() -> String {
    "as".to_string()
}

fn default_linker() -> String {
    "gcc".to_string()
}

fn default_local_compiler() -> String {
    "gcc".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerEntry {
    pub api_name: String,
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    #[serde(default)]
    pub extra_flags: Vec<String>,
    #[serde(default)]
    pub local_asm: bool,
    #[serde(default = "default_assembler")]
    pub assembler: String,
    #[serde(default)]
    pub assembler_args: Vec<String>,
    #[serde(default = "default_linker")]
    pub linker: String,
    #[serde(default)]
    pub local_linker_args: Vec<String>,
    #[serde(default)]
    pub local_compile: bool,
    #[serde(default = "default_local_compiler")]
    pub local_compiler: String,
    #[serde(default)]
    pub local_compiler_args: Vec<String>,
}

/// Fields shared by groups and variants. A variant's own value overrides
/// the group's for that field only.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TestFields {
    pub test_name: Option<String>,
    pub variant: Option<String>,
    pub display_name: Option<String>,
    pub file_name: Option<String>,
    pub additional_files: Option<Vec<String>>,
    #[serde(alias = "include_directories")]
    pub include_dirs: Option<Vec<String>>,
    pub prepend_lines: Option<Vec<String>>,
    pub detect_macro: Option<String>,
    pub detect_value: Option<i64>,
    pub auto: Option<bool>,
    pub include_in_table: Option<bool>,
    pub pass_when: Option<PassCriterion>,
    pub expect_exit: Option<i32>,
    pub stdin: Option<String>,
    pub run_args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestEntry {
    pub group: Option<String>,
    #[serde(flatten)]
    pub fields: TestFields,
    /// Grouped form; absent for flat entries where the entry is both the
    /// group and its only variant.
    pub variants: Option<Vec<TestFields>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Seconds between remote API requests.
    pub delay: Option<f64>,
    pub language: Option<String>,
    #[serde(default)]
    pub compilers: Vec<CompilerEntry>,
    #[serde(default)]
    pub tests: Vec<TestEntry>,
}

impl RunConfig {
    pub fn from_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("failed to parse YAML config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_str(&text)
    }

    pub fn delay(&self) -> f64 {
        self.delay.unwrap_or(0.5)
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("c")
    }

    /// Normalize compiler entries into immutable specs.
    pub fn compiler_specs(&self) -> Result<Vec<CompilerSpec>> {
        self.compilers.iter().map(compiler_spec).collect()
    }
}

fn compiler_spec(entry: &CompilerEntry) -> Result<CompilerSpec> {
    if entry.local_asm && entry.local_compile {
        bail!(
            "compiler {}: local_asm and local_compile are mutually exclusive",
            entry.api_name
        );
    }

    let mut extra_flags = entry.extra_flags.clone();
    let mode = if entry.local_asm {
        // Clang's integrated assembler syntax differs from GNU as; force
        // compatible output when the assembly is re-assembled locally.
        if entry.api_name.to_lowercase().contains("clang")
            && !extra_flags.iter().any(|f| f == "-fno-integrated-as")
        {
            extra_flags.push("-fno-integrated-as".to_string());
        }
        ExecMode::LocalAsm {
            assembler: entry.assembler.clone(),
            assembler_args: entry.assembler_args.clone(),
            linker: entry.linker.clone(),
            linker_args: entry.local_linker_args.clone(),
        }
    } else if entry.local_compile {
        ExecMode::LocalCompile {
            compiler: entry.local_compiler.clone(),
            compiler_args: entry.local_compiler_args.clone(),
        }
    } else {
        ExecMode::Remote
    };

    Ok(CompilerSpec {
        api_name: entry.api_name.clone(),
        nickname: entry.nickname.clone(),
        display_name: entry
            .display_name
            .clone()
            .unwrap_or_else(|| entry.api_name.clone()),
        extra_flags,
        mode,
    })
}

/// Resolve a possibly relative path against the config file's directory.
pub fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let p = PathBuf::from(path);
    if p.is_absolute() {
        p
    } else {
        base_dir.join(p)
    }
}
