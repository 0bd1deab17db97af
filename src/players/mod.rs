//! Player statistics, achievements and profiles.

pub mod dashboard;
pub mod profile;
pub mod stats;
