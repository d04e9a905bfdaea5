//! Match analysis engine: binds storage to the pure analytics.

pub mod analyzer;

pub use analyzer::MatchAnalyzer;
