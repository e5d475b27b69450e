pub mod archive;
pub mod config;
pub mod db;
pub mod import;
pub mod metrics;
pub mod ranking;
