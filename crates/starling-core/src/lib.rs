//! Core types and loader logic for the Starling star-schema warehouse.
//!
//! This crate is deliberately free of database and runtime dependencies.
//! Storage backends implement [`store::Warehouse`] and
//! [`store::StagingSource`]; the loader crate drives the pipeline.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod detect;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod merge;
pub mod staging;
pub mod store;
pub mod summary;
pub mod time;

pub use error::{Error, Result};
