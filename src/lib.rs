pub mod analysis;
pub mod config;
pub mod db;
pub mod errors;
pub mod graph;
pub mod mcp;
pub mod query;
pub mod service;
pub mod types;
