// CIS Rule Generator Core Library
//
// Converts benchmark documents (positioned PDF text or spreadsheet cells)
// into canonical rule records and saved-object templates.

pub mod benchmarks;
pub mod config;
pub mod error;
pub mod extractors;
pub mod migration;
pub mod normalizer;
pub mod processor;
pub mod references;
pub mod report;
pub mod storage;
pub mod types;

// Re-export main types and functions for easy use
pub use types::*;
pub use benchmarks::BenchmarkType;
pub use config::GeneratorConfig;
pub use error::RulegenError;
pub use processor::{BenchmarkProcessor, PipelineStages, RunSummary, StepProfiler};
pub use references::ReferenceChecker;
pub use storage::{FileStorage, NoOpStorage, RuleStorage};
