pub mod error;
pub mod events;
pub mod lock;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod state;
pub mod store;
