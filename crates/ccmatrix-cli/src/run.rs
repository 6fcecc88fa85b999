//! Top-level run flow: load config, plan cases, execute, write artifacts.

use crate::args::Cli;
use crate::{artifacts, exit_codes};
use anyhow::Result;
use ccmatrix_core::backend::remote::{ExplorerBackendFactory, ExplorerClient};
use ccmatrix_core::config::RunConfig;
use ccmatrix_core::engine::Runner;
use ccmatrix_core::pacer::Pacer;
use ccmatrix_core::planner::{self, PlanOptions};
use ccmatrix_core::report::summary::{self, Summary};
use ccmatrix_core::report::{console, table};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn run(cli: Cli) -> Result<i32> {
    let config = RunConfig::load(&cli.config)?;
    let base_dir = cli.config.parent().unwrap_or_else(|| Path::new("."));

    let compilers = config.compiler_specs()?;
    let tests = planner::expand_tests(&config, base_dir);
    let opts = PlanOptions {
        compiler_filters: cli.compiler.clone(),
        test_filters: cli.test.clone(),
        group_filters: cli.group.clone(),
        run_all: cli.all || cli.table,
    };
    let cases = planner::plan(&compilers, &tests, &opts)?;
    artifacts::prepare_results_dir(&cli.results_dir)?;

    let delay = cli.delay.unwrap_or_else(|| config.delay());
    let pacer = Arc::new(Pacer::new(Duration::from_secs_f64(delay)));
    let client = ExplorerClient::new(cli.base_url.clone(), pacer, cli.debug);
    let runner = Runner {
        factory: Arc::new(ExplorerBackendFactory { client }),
        language: cli
            .language
            .clone()
            .unwrap_or_else(|| config.language().to_string()),
        preprocess_only: cli.preprocess_only,
    };

    info!(
        cases = cases.len(),
        compilers = compilers.len(),
        delay,
        "starting run"
    );
    let arts = runner.run(&cases, &tests, Some(console::stderr_sink())).await;

    for outcome in &arts.outcomes {
        artifacts::write_case(&cli.results_dir, outcome)?;
    }
    let summary = Summary::from_run(&arts);
    summary::write_summary(&summary, &cli.results_dir.join("summary.json"))?;

    if cli.table {
        let content = table::render(&arts.outcomes, &compilers, &tests);
        let path = cli
            .table_file
            .clone()
            .unwrap_or_else(|| cli.results_dir.join("table.md"));
        table::write_table(&content, &path)?;
        info!(path = %path.display(), "table written");
    }

    let c = arts.counts();
    info!(
        passed = c.passed,
        failed = c.failed,
        skipped = c.skipped,
        errored = c.errored,
        duration_ms = arts.duration_ms,
        "run complete"
    );
    Ok(if arts.any_failed() {
        exit_codes::TEST_FAILED
    } else {
        exit_codes::SUCCESS
    })
}
