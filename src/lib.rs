//! ta-bot: course administration bot.
//!
//! Provisions per-semester group roles and channels on a chat platform, hands
//! out group roles through reactions on a tracking message, and tears the
//! whole structure down at the end of term.  The binary in `src/main.rs`
//! wires these modules together; integration tests use them directly.

pub mod bootstrap;
pub mod canvas;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod model;
pub mod palette;
pub mod platform;
pub mod semester;
pub mod store;
pub mod subsystems;
pub mod supervisor;
