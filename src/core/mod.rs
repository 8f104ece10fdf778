pub mod builtin_providers;
pub mod chat_stream;
pub mod config;
pub mod manager;
pub mod message;
pub mod providers;
pub mod session;
pub mod store;
