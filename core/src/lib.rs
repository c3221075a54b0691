//! Resilient client for the Heimdall consensus-metadata REST API.
//!
//! # Overview
//! Turns an unreliable HTTP endpoint into calls that either return typed data
//! or fail with a well-defined terminal reason: the caller's context ended or
//! the client was shut down.
//!
//! # Design
//! - [`http::fetch`] performs one bounded GET and decodes the JSON envelope.
//! - [`fetch::fetch_with_retry`] repeats it on a fixed clock, racing the
//!   caller's [`Context`] and the client's [`Shutdown`] signal between
//!   attempts.
//! - [`HeimdallClient`] maps each resource to its endpoint and envelope, and
//!   pages through event records.
//! - The network sits behind the [`Transport`] trait so the engine runs
//!   against a scripted transport on a paused clock in tests.

pub mod client;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod fetch;
pub mod http;
pub mod shutdown;
pub mod types;

#[cfg(test)]
mod test_support;

pub use client::HeimdallClient;
pub use config::ClientConfig;
pub use context::Context;
pub use error::{ContextError, HeimdallError, TransportError};
pub use fetch::fetch_with_retry;
pub use http::{HttpResponse, Transport, UreqTransport};
pub use shutdown::Shutdown;
pub use types::{
    Checkpoint, Count, Envelope, EventRecordWithTime, HeimdallSpan, Milestone, Validator, ValidatorSet,
};
