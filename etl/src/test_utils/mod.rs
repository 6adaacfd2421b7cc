//! Test doubles and fixtures for exercising the pipeline without Postgres or Elasticsearch.
//!
//! - [`source::MockSource`] serves scripted dependency sweeps and filters an in-memory
//!   film work table for primary sweeps, counting every call.
//! - [`destination::FlakyDestination`] stores documents in memory and can fail or reject
//!   deliveries on demand.
//! - [`http::StubIndex`] is a local HTTP server answering every request with a fixed
//!   status, for driving the real Elasticsearch client.
//! - [`storage::FaultyStorage`] is a [`crate::state::MemoryStorage`] whose persists can be
//!   made to fail.
//! - [`notify::TimedNotify`] waits for a condition with a timeout so a broken test fails
//!   instead of hanging.

pub mod destination;
pub mod fixtures;
pub mod http;
pub mod notify;
pub mod source;
pub mod storage;
