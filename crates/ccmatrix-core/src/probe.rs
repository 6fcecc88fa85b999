//! Macro probe injection and extraction.
//!
//! Auto-detection works by appending a declaration whose initializer forces
//! the preprocessor to expand the probed macro:
//!
//! ```c
//! int __CCMATRIX_MACRO_PROBE_FEATURE_IMPL__ = (int)(FEATURE_IMPL);
//! ```
//!
//! After preprocessing, the expanded integer literal is scraped back out and
//! the probe line is stripped from the artifact stored for reporting.

use regex::Regex;

const PROBE_PREFIX: &str = "__CCMATRIX_MACRO_PROBE_";

/// Append a probe line for `macro_name` to `source`.
pub fn inject(source: &str, macro_name: &str) -> String {
    format!(
        "{}\nint {PROBE_PREFIX}{macro_name}__ = (int)({macro_name});\n",
        source.trim_end_matches('\n')
    )
}

/// Extract the probed value of `macro_name` from preprocessed output.
///
/// Tolerates optional casts and parenthesization around the literal, and
/// accepts decimal or hex in either sign.
pub fn extract(preprocessed: &str, macro_name: &str) -> Option<i64> {
    let pattern = format!(
        r"{PROBE_PREFIX}{}__\s*=\s*(?:\([^)]*\)\s*)?\(?\s*(-?0x[0-9a-fA-F]+|-?\d+)\s*\)?",
        regex::escape(macro_name)
    );
    let re = Regex::new(&pattern).ok()?;
    let literal = re.captures(preprocessed)?.get(1)?.as_str();
    parse_int_literal(literal)
}

/// Remove probe lines for `macro_name` from preprocessed output.
pub fn strip(preprocessed: &str, macro_name: &str) -> String {
    let marker = format!("{PROBE_PREFIX}{macro_name}__");
    preprocessed
        .lines()
        .filter(|line| !line.contains(&marker))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_int_literal(literal: &str) -> Option<i64> {
    if let Some(hex) = literal.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(hex) = literal.strip_prefix("-0x") {
        return i64::from_str_radix(hex, 16).ok().map(|v| -v);
    }
    literal.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_appends_probe_line() {
        let out = inject("int main(void) { return 0; }\n", "FEATURE_IMPL");
        assert!(out.ends_with(
            "int __CCMATRIX_MACRO_PROBE_FEATURE_IMPL__ = (int)(FEATURE_IMPL);\n"
        ));
        assert!(out.starts_with("int main(void)"));
    }

    #[test]
    fn extract_decimal_value() {
        let pp = "int __CCMATRIX_MACRO_PROBE_FEATURE_IMPL__ = (int)(2);";
        assert_eq!(extract(pp, "FEATURE_IMPL"), Some(2));
    }

    #[test]
    fn extract_hex_and_negative_values() {
        let pp = "int __CCMATRIX_MACRO_PROBE_FLAGS__ = (int)(0x1f);";
        assert_eq!(extract(pp, "FLAGS"), Some(31));
        let pp = "int __CCMATRIX_MACRO_PROBE_LEVEL__ = -3;";
        assert_eq!(extract(pp, "LEVEL"), Some(-3));
    }

    #[test]
    fn extract_value_expanded_without_cast() {
        // Some preprocessors drop the (int) cast spelling entirely.
        let pp = "int __CCMATRIX_MACRO_PROBE_V__ = 201112;";
        assert_eq!(extract(pp, "V"), Some(201112));
    }

    #[test]
    fn extract_missing_macro_is_none() {
        assert_eq!(extract("int x = 1;", "FEATURE_IMPL"), None);
        // Unexpanded macro name left verbatim is not a value.
        let pp = "int __CCMATRIX_MACRO_PROBE_FOO__ = (int)(FOO);";
        assert_eq!(extract(pp, "FOO"), None);
    }

    #[test]
    fn strip_removes_only_probe_lines() {
        let pp = "int main(void) { return 0; }\nint __CCMATRIX_MACRO_PROBE_X__ = 1;\n";
        let stripped = strip(pp, "X");
        assert!(stripped.contains("int main"));
        assert!(!stripped.contains("PROBE"));
    }
}
