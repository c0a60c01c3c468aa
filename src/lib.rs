pub mod config;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod figure;
pub mod server;
pub mod types;
