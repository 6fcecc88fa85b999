use ccmatrix_core::backend::remote::DEFAULT_BASE_URL;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ccmatrix",
    version,
    about = "Run C test matrices across compiler configurations via a Compiler Explorer style API"
)]
pub struct Cli {
    /// Path to the YAML matrix config
    pub config: PathBuf,

    /// Directory for output files
    #[arg(long, short = 'o', default_value = "results", value_name = "DIR")]
    pub results_dir: PathBuf,

    /// Filter by compiler nickname (can be repeated)
    #[arg(long, short = 'c', value_name = "NICKNAME")]
    pub compiler: Vec<String>,

    /// Filter by test name or variant (can be repeated)
    #[arg(long, short = 't', value_name = "NAME")]
    pub test: Vec<String>,

    /// Filter by test group (can be repeated)
    #[arg(long, short = 'g', value_name = "NAME")]
    pub group: Vec<String>,

    /// Run every declared variant, not just the auto representative
    #[arg(long)]
    pub all: bool,

    /// Write the markdown result table (implies --all)
    #[arg(long)]
    pub table: bool,

    /// Path for the markdown table (default: <results-dir>/table.md)
    #[arg(long, value_name = "PATH")]
    pub table_file: Option<PathBuf>,

    /// Seconds between remote API requests, overriding the config
    #[arg(long, value_name = "SECS")]
    pub delay: Option<f64>,

    /// Source language sent to the API, overriding the config
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Stop every case after the preprocess stage
    #[arg(long)]
    pub preprocess_only: bool,

    /// Keep raw API responses alongside the artifacts
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Remote API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL, value_name = "URL", env = "CCMATRIX_BASE_URL")]
    pub base_url: String,
}
