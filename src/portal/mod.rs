//! Headless-browser helper adapter.
//!
//! The browsing context and the content extractor run in an external helper
//! process spoken to over NDJSON on stdio. [`PortalHelper`] implements both
//! [`crate::session::BrowsingContext`] and [`crate::extract::ContentExtractor`].

pub mod client;
pub mod codec;
pub mod process;

pub use client::PortalHelper;
