pub mod analyzer;
pub mod crossuser;

pub use analyzer::{AnalyzerOptions, HistoryAnalyzer, HistorySource};
pub use crossuser::compare_users;
