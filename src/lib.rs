//! Email Triage: request classification for loan-servicing inboxes.

pub mod api;
pub mod config;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod tickets;
