//! Pure analytics: aggregation, the probability model, edges and
//! multi-bet strategies. Nothing here touches the database.

pub mod arbitrage;
pub mod compositions;
pub mod edge;
pub mod kelly;
pub mod multibets;
pub mod probability;
pub mod stats;
