mod codec;
mod config;
mod diagnostics;
mod engine;
mod lifecycle_state;
mod store;
