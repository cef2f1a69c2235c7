pub mod dedup;
pub mod generator;
pub mod indicators;
pub mod ranking;
pub mod services;
