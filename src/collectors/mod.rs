//! Inbound data beyond the historical dataset: bookmaker odds and map
//! vetoes.

pub mod odds;
pub mod veto;
