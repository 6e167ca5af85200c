//! Application startup utilities module.

mod http;
mod logging;
mod shutdown;
mod store;

pub use http::main_server;
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
pub use store::open_store;
