//! Instance- and account-scoped Mastodon API access.

pub mod client;
pub mod rate;
pub mod types;

pub use client::{Error, MastodonClient};
pub use types::{Account, Notification, Status};
