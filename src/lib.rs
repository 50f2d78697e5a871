// src/lib.rs
pub mod backtest_engine;
pub mod detection;
pub mod errors;
pub mod extremum;
pub mod pattern_tracker;
pub mod signal;
pub mod statistics;
pub mod types;
pub mod validation;
