pub mod mysql;
pub mod postgres;
pub mod render;
pub mod sqlite;
