//! Ward logic that does not touch storage or HTTP.

pub mod ai;
pub mod census;
pub mod charts;
pub mod lifecycle;
pub mod period;
pub mod prompts;
pub mod vitals;
