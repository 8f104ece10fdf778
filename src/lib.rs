//! llmschat is a terminal chat client for hosted LLM APIs that keeps several
//! conversations open at once.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns sessions, the provider adapters, the stream relay, the
//!   SQLite store and configuration.
//! - [`ui`] runs the interactive line loop and renders presentation events.
//! - [`commands`] parses the slash commands typed into the chat.
//! - [`api`] defines the wire payloads exchanged with providers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which wires the store, the provider registry
//! and the [`core::manager::ChatManager`] together.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod logging;
pub mod ui;
pub mod utils;
