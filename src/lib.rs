// Module declarations
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod progress;
pub mod report;
pub mod results;
pub mod scan;
pub mod service;

pub use error::{AppScanError, AppScanResult};
