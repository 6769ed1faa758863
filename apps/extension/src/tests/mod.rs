mod error;
mod host;
mod logger;
