pub mod hw;
pub mod units;
