//! NVD feed access: query windows, wire decoding, and the retrying client.

pub mod client;
pub mod schema;
pub mod window;

pub use client::{FeedSettings, FeedSource, FetchOutcome, NvdClient};
pub use schema::FeedRecord;
pub use window::QueryWindow;
