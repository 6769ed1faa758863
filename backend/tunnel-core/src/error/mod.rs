pub mod codec;
pub mod config;
pub mod control;
pub mod engine;
pub mod exchange;
pub mod lifecycle;
pub mod store;
