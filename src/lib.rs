pub mod agent;
pub mod aggregate;
pub mod config;
pub mod input;
pub mod metric;
pub mod output;
