//! Utility modules shared across the crate

pub mod throttle;

pub use throttle::LogThrottler;
