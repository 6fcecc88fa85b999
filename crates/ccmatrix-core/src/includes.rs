//! Include directive preservation across remote preprocessing.
//!
//! Header-filtered preprocessing drops `#include` lines together with the
//! header content they pulled in, which leaves the preprocessed artifact
//! unbuildable by a local compiler. Before the request, every include line
//! is bracketed with marker declarations that survive preprocessing:
//!
//! ```c
//! void __ccmatrix_include_start_1(void);
//! #include <stdio.h>
//! void __ccmatrix_include_end_1(void);
//! ```
//!
//! Afterwards the marked span (markers plus whatever the header expanded
//! to) is folded back into the original directive, so the stored artifact
//! keeps its includes and local-compile mode can build it.

use regex::{NoExpand, Regex};

const MARKER_PREFIX: &str = "__ccmatrix_include_";

/// One bracketed include: marker index plus the original directive text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeMarker {
    index: usize,
    directive: String,
}

fn include_pattern() -> Option<Regex> {
    Regex::new(r##"^(\s*)#\s*include\s*[<"][^>"]+[>"]"##).ok()
}

/// Bracket every `#include` line in `source` with marker declarations.
/// Returns the modified source and the markers needed to undo it.
pub fn mark(source: &str) -> (String, Vec<IncludeMarker>) {
    let Some(re) = include_pattern() else {
        return (source.to_string(), Vec::new());
    };
    let mut markers = Vec::new();
    let mut out = Vec::new();
    for line in source.split('\n') {
        match re.captures(line) {
            Some(c) => {
                let indent = &c[1];
                let index = markers.len() + 1;
                out.push(format!("{indent}void {MARKER_PREFIX}start_{index}(void);"));
                out.push(line.to_string());
                out.push(format!("{indent}void {MARKER_PREFIX}end_{index}(void);"));
                markers.push(IncludeMarker {
                    index,
                    directive: c[0][c[1].len()..].to_string(),
                });
            }
            None => out.push(line.to_string()),
        }
    }
    (out.join("\n"), markers)
}

/// Replace each marked span in preprocessed output with its original
/// `#include` directive. A span whose end marker was lost (a missing header
/// truncates preprocessing output) is restored from the start marker alone.
pub fn restore(preprocessed: &str, markers: &[IncludeMarker]) -> String {
    let mut result = preprocessed.to_string();
    for marker in markers {
        let start = format!(
            r"void\s+{MARKER_PREFIX}start_{}\s*\(\s*(?:void\s*)?\)\s*;",
            marker.index
        );
        let end = format!(
            r"void\s+{MARKER_PREFIX}end_{}\s*\(\s*(?:void\s*)?\)\s*;",
            marker.index
        );
        let replaced = Regex::new(&format!(r"(?s){start}.*?{end}"))
            .ok()
            .map(|re| re.replace(&result, NoExpand(&marker.directive)).into_owned());
        match replaced {
            Some(text) if text != result => result = text,
            _ => {
                if let Ok(re) = Regex::new(&start) {
                    result = re.replace(&result, NoExpand(&marker.directive)).into_owned();
                }
            }
        }
    }
    result
}
