//! Markdown result table.
//!
//! Rows are compilers, columns are the non-auto variants flagged for the
//! table. A ⭐ marks the variant matching the compiler's auto-detected value.
//! Compilers using a local toolchain get a footnote naming the local tool
//! and its version.

use crate::backend::local;
use crate::errors::Stage;
use crate::model::{CaseOutcome, CaseStatus, CompilerSpec, ExecMode, TestSpec};
use std::collections::HashMap;
use std::path::Path;

const FOOTNOTE_MARKERS: [&str; 4] = ["*", "**", "***", "****"];

/// Cell icon for one outcome. Build-stage failures and runtime failures get
/// distinct icons; infrastructure errors leave the cell empty and absent
/// results render as a dash.
fn status_icon(outcome: Option<&CaseOutcome>) -> String {
    let Some(o) = outcome else {
        return "—".to_string();
    };
    match o.status {
        CaseStatus::Error | CaseStatus::Skip => String::new(),
        CaseStatus::Pass if o.has_warnings => "✅ℹ️".to_string(),
        CaseStatus::Pass => "✅".to_string(),
        CaseStatus::Fail => match o.stage {
            Some(Stage::Execute) => "⚠️".to_string(),
            _ => "❌".to_string(),
        },
    }
}

/// Emoji render two columns wide in most monospace fonts.
fn visual_len(s: &str) -> usize {
    let extras: usize = ["✅", "❌", "⭐", "⚠️", "ℹ️"]
        .iter()
        .map(|e| s.matches(e).count())
        .sum();
    s.chars().count() + extras
}

/// Footnote assignment: (marker per compiler display name, rendered footnote
/// lines in marker order). Compilers sharing a mode and local tool version
/// share a marker.
fn footnotes<F>(compilers: &[CompilerSpec], version_of: F) -> (HashMap<String, String>, Vec<String>)
where
    F: Fn(&str) -> Option<(String, String)>,
{
    let mut configs: Vec<(bool, String)> = Vec::new(); // (is_local_compile, version)
    let mut map = HashMap::new();
    for c in compilers {
        let (is_local_compile, tool) = match &c.mode {
            ExecMode::LocalCompile { compiler, .. } => (true, compiler.as_str()),
            // For local-asm the linker is the local toolchain that matters.
            ExecMode::LocalAsm { linker, .. } => (false, linker.as_str()),
            ExecMode::Remote => continue,
        };
        let version = version_of(tool)
            .map(|(name, ver)| format!("{name} {ver}"))
            .unwrap_or_else(|| tool.to_string());
        let key = (is_local_compile, version);
        let idx = match configs.iter().position(|k| *k == key) {
            Some(idx) => idx,
            None if configs.len() < FOOTNOTE_MARKERS.len() => {
                configs.push(key);
                configs.len() - 1
            }
            None => continue,
        };
        map.insert(c.display_name.clone(), FOOTNOTE_MARKERS[idx].to_string());
    }
    let lines = configs
        .iter()
        .enumerate()
        .map(|(idx, (is_local_compile, version))| {
            let marker = FOOTNOTE_MARKERS[idx];
            if *is_local_compile {
                format!(
                    "\\{marker} This compiler was only used for preprocessing and the result \
                     was compiled locally with {version}.  "
                )
            } else {
                format!(
                    "\\{marker} This compiler outputted assembly which was then assembled \
                     and run locally with {version}.  "
                )
            }
        })
        .collect();
    (map, lines)
}

/// Render the table, sniffing local tool versions with `<tool> --version`.
pub fn render(outcomes: &[CaseOutcome], compilers: &[CompilerSpec], tests: &[TestSpec]) -> String {
    render_with_versions(outcomes, compilers, tests, local::tool_version)
}

pub fn render_with_versions<F>(
    outcomes: &[CaseOutcome],
    compilers: &[CompilerSpec],
    tests: &[TestSpec],
    version_of: F,
) -> String
where
    F: Fn(&str) -> Option<(String, String)>,
{
    let columns: Vec<&TestSpec> = tests
        .iter()
        .filter(|t| t.include_in_table && !t.auto)
        .collect();

    let mut groups: Vec<&str> = tests.iter().map(|t| t.group.as_str()).collect();
    groups.sort_unstable();
    groups.dedup();
    let multi_group = groups.len() > 1;

    // compiler display -> (group, variant) -> outcome
    let mut lookup: HashMap<&str, HashMap<(&str, &str), &CaseOutcome>> = HashMap::new();
    // compiler display -> group -> auto-detected value
    let mut auto_vals: HashMap<&str, HashMap<&str, i64>> = HashMap::new();
    for o in outcomes {
        lookup
            .entry(o.compiler_display.as_str())
            .or_default()
            .insert((o.group.as_str(), o.variant.as_str()), o);
        if o.is_auto {
            if let Some(v) = o.detected_value {
                auto_vals
                    .entry(o.compiler_display.as_str())
                    .or_default()
                    .insert(o.group.as_str(), v);
            }
        }
    }

    let (markers, footnote_lines) = footnotes(compilers, version_of);

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut header = vec!["CC".to_string()];
    for t in &columns {
        header.push(if multi_group {
            format!("{}:{}", t.group, t.display_name)
        } else {
            t.display_name.clone()
        });
    }
    rows.push(header);

    for compiler in compilers {
        let cells = lookup.get(compiler.display_name.as_str());
        let detected = auto_vals.get(compiler.display_name.as_str());
        let mut name = compiler.display_name.clone();
        if let Some(marker) = markers.get(&compiler.display_name) {
            name.push_str(marker);
        }
        let mut row = vec![name];
        for t in &columns {
            let outcome = cells.and_then(|m| m.get(&(t.group.as_str(), t.variant.as_str())));
            let mut cell = status_icon(outcome.copied());
            let starred = detected
                .and_then(|g| g.get(t.group.as_str()))
                .zip(t.detect_value)
                .is_some_and(|(&got, want)| got == want);
            if starred {
                cell = format!("⭐{cell}");
            }
            row.push(cell);
        }
        rows.push(row);
    }

    let ncols = rows[0].len();
    let mut widths = vec![0usize; ncols];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(visual_len(cell));
        }
    }
    let format_row = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{cell}{}", " ".repeat(widths[i] - visual_len(cell))))
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let mut lines = vec![format_row(&rows[0])];
    lines.push(format!(
        "| {} |",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join(" | ")
    ));
    for row in &rows[1..] {
        lines.push(format_row(row));
    }

    if !footnote_lines.is_empty() {
        lines.push(String::new());
        lines.extend(footnote_lines);
    }

    lines.join("\n") + "\n"
}

pub fn write_table(content: &str, out: &Path) -> anyhow::Result<()> {
    std::fs::write(out, content)?;
    Ok(())
}
