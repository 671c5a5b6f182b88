pub mod common;
pub mod date_delete_insert;
pub mod full_refresh;
pub mod id_increment;
pub mod missing_ranges;
pub mod partition_window;
pub mod tail_append;
pub mod timestamp;
