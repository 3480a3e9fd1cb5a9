//! Code shared between the datalogger threads and its library crates

pub mod error;
pub mod over_run;
pub mod sample;
pub mod snapshot;
pub mod types;
