pub mod core;
pub mod records;

pub mod connection;
pub mod cursor;
pub mod dataset;
pub mod events;
pub mod job;
