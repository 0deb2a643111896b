//! Shared infrastructure for the syncline worker crates.
//!
//! This crate provides the two things every component needs:
//!
//! - [`SyncError`], the single error taxonomy flowing through the request
//!   pipeline. Every variant knows whether it is retryable and whether the
//!   server attached a retry-after hint, which is all the retry engine ever
//!   asks of an error.
//! - The [`events`] module: a small typed listener system that component
//!   builders expose through `on_*` hooks for observability.
//! - The [`transport`] module: the injectable transport contract every
//!   outbound HTTP call goes through, expressed as a boxed
//!   [`tower::Service`].

pub mod error;
pub mod events;
pub mod transport;

pub use error::SyncError;
