//! Auto-variant resolution.
//!
//! An `auto` case does not fix which concrete variant it represents; the
//! compiler's own preprocessor decides. We inject a macro probe, preprocess
//! once, and match the expanded value against the concrete variants declared
//! in the same group. Probe results are cached per (compiler, group) so a
//! group probed once is never probed again for the same compiler.

use crate::backend::{Backend, PreprocessOutput, SourceUnit};
use crate::errors::{StageError, StageResult};
use crate::model::TestSpec;
use crate::probe;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Outcome of probing one auto case.
#[derive(Debug)]
pub struct Probe {
    pub value: i64,
    /// Output of the probing preprocess request; `None` when the value came
    /// from the cache and no request was made.
    pub preprocess: Option<PreprocessOutput>,
}

#[derive(Default)]
pub struct VariantResolver {
    cache: Mutex<HashMap<(String, String), i64>>,
}

impl VariantResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe the macro value for `test` under `compiler_api`. The returned
    /// preprocess output still contains the probe line; callers strip it
    /// before storing the artifact.
    pub async fn probe(
        &self,
        backend: &dyn Backend,
        compiler_api: &str,
        test: &TestSpec,
        unit: &SourceUnit,
    ) -> StageResult<Probe> {
        let macro_name = test.detect_macro.as_deref().ok_or_else(|| {
            StageError::variant_unresolved(format!(
                "{}: auto variant declares no detect_macro",
                test.test_name
            ))
        })?;

        let key = (compiler_api.to_string(), test.group.clone());
        if let Some(&value) = self.cache.lock().await.get(&key) {
            return Ok(Probe {
                value,
                preprocess: None,
            });
        }

        let mut probed = unit.clone();
        probed.source = probe::inject(&unit.source, macro_name);
        let output = backend.preprocess(&probed).await?;

        let value = probe::extract(&output.text, macro_name).ok_or_else(|| {
            StageError::variant_unresolved(format!(
                "macro {macro_name} did not expand to an integer"
            ))
            .with_detail(output.compiler_stderr.clone())
        })?;

        self.cache.lock().await.insert(key, value);
        Ok(Probe {
            value,
            preprocess: Some(output),
        })
    }

    /// Pick the concrete variant matching a probed value: first declared
    /// variant in the same group whose `detect_value` equals it.
    pub fn match_variant<'a>(
        &self,
        candidates: &'a [TestSpec],
        group: &str,
        value: i64,
    ) -> StageResult<&'a TestSpec> {
        candidates
            .iter()
            .find(|t| !t.auto && t.group == group && t.detect_value == Some(value))
            .ok_or_else(|| {
                StageError::variant_unresolved(format!(
                    "no variant in group {group} declares detect_value {value}"
                ))
            })
    }
}
