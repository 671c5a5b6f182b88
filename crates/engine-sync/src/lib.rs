pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod strategy;
pub mod telemetry;
pub mod transform;
pub mod validate;

#[cfg(test)]
pub(crate) mod testkit;
