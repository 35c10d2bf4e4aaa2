//! Outbound messaging abstractions (Telegram and Discord adapters live in their own crates).

pub mod port;
pub mod throttled;
pub mod types;
