pub mod connector;
pub mod dest;
pub mod error;
pub mod http;
pub mod request;
pub mod source;
pub mod sql;
