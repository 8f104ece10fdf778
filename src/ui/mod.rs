//! Line-based front end for interactive chat.
//!
//! [`chat_loop`] dispatches typed input to [`crate::commands`] and the
//! [`crate::core::manager::ChatManager`]; [`transcript`] turns the manager's
//! presentation events into terminal output.

pub mod chat_loop;
pub mod transcript;
