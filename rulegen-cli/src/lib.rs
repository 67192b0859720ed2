// All core functionality is in cis-rulegen-core
// This CLI acts as a thin wrapper around the core library

// CLI-specific modules
pub mod link_checker;

// Re-export core types for convenience
pub use rulegen_core::*;

// Re-export CLI utilities
pub use link_checker::HttpLinkChecker;
