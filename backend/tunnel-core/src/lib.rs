pub mod config;
pub mod control;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod lifecycle;
pub mod protocol;
pub mod store;

mod transport;
#[cfg(test)]
mod tests;

pub const APP_DIR_NAME: &str = "tunnel-extension";
pub const CACHE_DIR_NAME: &str = "cache";
pub const WORKING_DIR_NAME: &str = "working";
pub const STDERR_LOG_NAME: &str = "stderr.log";
pub const STDERR_LOG_RELATIVE: &str = const_format::concatcp!(CACHE_DIR_NAME, "/", STDERR_LOG_NAME);
pub const PROFILE_SOCKET_NAME: &str = "profile_service.sock";
pub const COMMAND_SOCKET_NAME: &str = "command.sock";
pub const ENGINE_CONFIG_FILE_NAME: &str = "config.json";
