//! VCT Edge Terminal: Valorant esports odds tracking and betting analytics.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod analysis;
pub mod api;
pub mod catalog;
pub mod collectors;
pub mod config;
pub mod engine;
pub mod format;
pub mod query;
pub mod storage;
pub mod types;
