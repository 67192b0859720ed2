//! Typed errors for the rule generation pipeline.
//!
//! Every variant here is structural: it means the input (or the static
//! tables it is checked against) has to be fixed, so none of them are
//! recovered per rule. They travel up as `anyhow::Error` and stop the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RulegenError {
    /// Rule number prefix has no entry in the benchmark's section taxonomy
    #[error("no section for rule {rule_number} (prefix '{prefix}') in {benchmark} taxonomy")]
    SectionNotFound {
        benchmark: String,
        rule_number: String,
        prefix: String,
    },

    /// Spreadsheet rule row points at a section number that has no header row
    #[error("no section row '{section}' for rule {rule_number}")]
    SectionRowNotFound { rule_number: String, section: String },

    /// Rule block without a usable "<number> <title>" header line
    #[error("rule block has no header line: {0:?}")]
    MissingHeader(String),

    #[error("unknown benchmark type '{0}' (expected one of: kubernetes, eks, aws)")]
    UnknownBenchmarkType(String),

    /// Benchmark file name does not follow `<Name>_Benchmark_<version>`
    #[error("cannot derive benchmark name/version from file name '{0}'")]
    MalformedBenchmarkFileName(String),

    /// Benchmark name matches no known benchmark, so it has no short id
    #[error("rule {rule_number}: benchmark '{benchmark}' has no known id, refusing to write its record")]
    UnresolvedBenchmark { benchmark: String, rule_number: String },

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Link check could not be performed at all (network, TLS, DNS on our side)
    #[error("reference check for {url} failed: {reason}")]
    ReferenceTransport { url: String, reason: String },
}
