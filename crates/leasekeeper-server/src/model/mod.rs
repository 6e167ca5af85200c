//! Data models module
//!
//! - `config` - Configuration management
//! - `response` - HTTP response envelope and error mapping
//! - `app_state` - Application state shared across handlers

pub mod app_state;
pub mod config;
pub mod response;

pub use app_state::AppState;
pub use config::{Cli, Configuration};
pub use response::Result;
