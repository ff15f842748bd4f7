//! Core types, normalisation and ingestion logic for the trainlog fact store.
//!
//! This crate has no database dependencies. Storage backends
//! implement [`store::EntityStore`]; the [`ingest::Ingestor`] drives them from
//! decoded feed snapshots.

// Store traits spell out `impl Future + Send`; implementations use `async fn`.
#![allow(async_fn_in_trait)]

pub mod chain;
pub mod entity;
pub mod error;
pub mod fact;
pub mod ingest;
pub mod memory;
pub mod normalize;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
