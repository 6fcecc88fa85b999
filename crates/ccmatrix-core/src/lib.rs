//! Compile-execute orchestration engine for compiler test matrices.
//!
//! The engine expands a declarative matrix of (compilers × tests × variants)
//! into concrete cases, dispatches each case to a remote Compiler Explorer
//! style API or a local toolchain, and normalizes every outcome into one
//! uniform result model consumed by reporting.

pub mod backend;
pub mod config;
pub mod engine;
pub mod errors;
pub mod includes;
pub mod model;
pub mod pacer;
pub mod planner;
pub mod probe;
pub mod report;
pub mod resolver;

pub use errors::{ErrorKind, Stage, StageError, StageResult};
pub use model::{Case, CaseOutcome, CaseStatus, CompilerSpec, ExecMode, TestSpec};
