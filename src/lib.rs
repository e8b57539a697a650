//! Mastodon bot that announces a meeting link to its followers when one of
//! them asks it to sound the horn.

pub mod config;
pub mod mastodon;
pub mod scanner;
pub mod timefmt;
